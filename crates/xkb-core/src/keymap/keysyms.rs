//! Keysym values used by the built-in keymap.
//!
//! Values follow X11/keysymdef.h.
//!
//! # What is a keysym? (for beginners)
//!
//! A keysym names what a key *means* rather than where it sits.  Printable
//! Latin-1 characters use their character code (`a` is `0x0061`, `A` is
//! `0x0041`); function and modifier keys live in the `0xFFxx` block:
//!
//! | Name        | Value  |
//! |-------------|--------|
//! | `Return`    | 0xFF0D |
//! | `Escape`    | 0xFF1B |
//! | `Shift_L`   | 0xFFE1 |
//! | `Caps_Lock` | 0xFFE5 |

use super::Keysym;

// ── TTY and cursor keys ───────────────────────────────────────────────────────

pub const BACKSPACE: Keysym = 0xff08;
pub const TAB: Keysym = 0xff09;
pub const ISO_LEFT_TAB: Keysym = 0xfe20;
pub const RETURN: Keysym = 0xff0d;
pub const PAUSE: Keysym = 0xff13;
pub const SCROLL_LOCK: Keysym = 0xff14;
pub const SYS_REQ: Keysym = 0xff15;
pub const ESCAPE: Keysym = 0xff1b;
pub const DELETE: Keysym = 0xffff;
pub const HOME: Keysym = 0xff50;
pub const LEFT: Keysym = 0xff51;
pub const UP: Keysym = 0xff52;
pub const RIGHT: Keysym = 0xff53;
pub const DOWN: Keysym = 0xff54;
pub const PAGE_UP: Keysym = 0xff55;
pub const PAGE_DOWN: Keysym = 0xff56;
pub const END: Keysym = 0xff57;
pub const PRINT: Keysym = 0xff61;
pub const INSERT: Keysym = 0xff63;
pub const MENU: Keysym = 0xff67;
pub const NUM_LOCK: Keysym = 0xff7f;

// ── Keypad ────────────────────────────────────────────────────────────────────

pub const KP_ENTER: Keysym = 0xff8d;
pub const KP_HOME: Keysym = 0xff95;
pub const KP_LEFT: Keysym = 0xff96;
pub const KP_UP: Keysym = 0xff97;
pub const KP_RIGHT: Keysym = 0xff98;
pub const KP_DOWN: Keysym = 0xff99;
pub const KP_PAGE_UP: Keysym = 0xff9a;
pub const KP_PAGE_DOWN: Keysym = 0xff9b;
pub const KP_END: Keysym = 0xff9c;
pub const KP_BEGIN: Keysym = 0xff9d;
pub const KP_INSERT: Keysym = 0xff9e;
pub const KP_DELETE: Keysym = 0xff9f;
pub const KP_MULTIPLY: Keysym = 0xffaa;
pub const KP_ADD: Keysym = 0xffab;
pub const KP_SUBTRACT: Keysym = 0xffad;
pub const KP_DECIMAL: Keysym = 0xffae;
pub const KP_DIVIDE: Keysym = 0xffaf;
pub const KP_0: Keysym = 0xffb0;

/// Keypad digit `n` (0-9).
pub const fn kp_digit(n: u8) -> Keysym {
    KP_0 + n as Keysym
}

// ── Function keys ─────────────────────────────────────────────────────────────

pub const F1: Keysym = 0xffbe;

/// Function key `Fn` (1-based).
pub const fn function_key(n: u8) -> Keysym {
    F1 + (n as Keysym) - 1
}

// ── Modifiers ─────────────────────────────────────────────────────────────────

pub const SHIFT_L: Keysym = 0xffe1;
pub const SHIFT_R: Keysym = 0xffe2;
pub const CONTROL_L: Keysym = 0xffe3;
pub const CONTROL_R: Keysym = 0xffe4;
pub const CAPS_LOCK: Keysym = 0xffe5;
pub const META_L: Keysym = 0xffe7;
pub const ALT_L: Keysym = 0xffe9;
pub const ALT_R: Keysym = 0xffea;
pub const SUPER_L: Keysym = 0xffeb;
pub const SUPER_R: Keysym = 0xffec;
pub const ISO_LEVEL3_SHIFT: Keysym = 0xfe03;
pub const ISO_NEXT_GROUP: Keysym = 0xfe08;

// ── Latin-1 ───────────────────────────────────────────────────────────────────

pub const SPACE: Keysym = 0x0020;

/// Keysym of a printable ASCII character.
pub const fn latin1(c: char) -> Keysym {
    c as Keysym
}
