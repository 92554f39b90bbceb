//! The built-in keymap: a US layout on evdev keycodes.
//!
//! Used when no compiled keymap is available, so a keyboard is never left
//! without a map.

use tracing::debug;

use super::action::{action_flags, ModAction};
use super::indicator_map::im_use;
use super::keysyms::{self as ks, function_key, kp_digit, latin1};
use super::names::{parts, KeyName};
use super::{
    map_parts, mods, Action, AtomTable, GroupInfo, IndicatorMap, KeyType, Keycode, Keymap,
    KeymapError, Keysym, ModsDef, OutOfRange, ALPHABETIC_INDEX, KEYPAD_INDEX, NUM_KBD_GROUPS,
    NUM_REQUIRED_TYPES, ONE_LEVEL_INDEX, TWO_LEVEL_INDEX,
};

/// Virtual modifier indices bound by the built-in keymap.
pub mod vmod_index {
    pub const NUM_LOCK: usize = 0;
    pub const ALT: usize = 1;
    pub const SUPER: usize = 2;
    pub const SCROLL_LOCK: usize = 3;
}

/// Indicator indices defined by the built-in keymap.
pub mod led_index {
    pub const CAPS_LOCK: usize = 0;
    pub const NUM_LOCK: usize = 1;
    pub const SCROLL_LOCK: usize = 2;
}

const MIN_KEYCODE: Keycode = 8;
const MAX_KEYCODE: Keycode = 255;

type KeyDef = (Keycode, &'static str, usize, &'static [Keysym]);

const fn two(c: char, shifted: char) -> [Keysym; 2] {
    [latin1(c), latin1(shifted)]
}

const KEY_ESC: [Keysym; 1] = [ks::ESCAPE];
const KEY_AE01: [Keysym; 2] = two('1', '!');
const KEY_AE02: [Keysym; 2] = two('2', '@');
const KEY_AE03: [Keysym; 2] = two('3', '#');
const KEY_AE04: [Keysym; 2] = two('4', '$');
const KEY_AE05: [Keysym; 2] = two('5', '%');
const KEY_AE06: [Keysym; 2] = two('6', '^');
const KEY_AE07: [Keysym; 2] = two('7', '&');
const KEY_AE08: [Keysym; 2] = two('8', '*');
const KEY_AE09: [Keysym; 2] = two('9', '(');
const KEY_AE10: [Keysym; 2] = two('0', ')');
const KEY_AE11: [Keysym; 2] = two('-', '_');
const KEY_AE12: [Keysym; 2] = two('=', '+');
const KEY_BKSP: [Keysym; 1] = [ks::BACKSPACE];
const KEY_TAB: [Keysym; 2] = [ks::TAB, ks::ISO_LEFT_TAB];
const KEY_AD11: [Keysym; 2] = two('[', '{');
const KEY_AD12: [Keysym; 2] = two(']', '}');
const KEY_RTRN: [Keysym; 1] = [ks::RETURN];
const KEY_LCTL: [Keysym; 1] = [ks::CONTROL_L];
const KEY_AC10: [Keysym; 2] = two(';', ':');
const KEY_AC11: [Keysym; 2] = two('\'', '"');
const KEY_TLDE: [Keysym; 2] = two('`', '~');
const KEY_LFSH: [Keysym; 1] = [ks::SHIFT_L];
const KEY_BKSL: [Keysym; 2] = two('\\', '|');
const KEY_AB08: [Keysym; 2] = two(',', '<');
const KEY_AB09: [Keysym; 2] = two('.', '>');
const KEY_AB10: [Keysym; 2] = two('/', '?');
const KEY_RTSH: [Keysym; 1] = [ks::SHIFT_R];
const KEY_KPMU: [Keysym; 1] = [ks::KP_MULTIPLY];
const KEY_LALT: [Keysym; 2] = [ks::ALT_L, ks::META_L];
const KEY_SPCE: [Keysym; 1] = [ks::SPACE];
const KEY_CAPS: [Keysym; 1] = [ks::CAPS_LOCK];
const KEY_NMLK: [Keysym; 1] = [ks::NUM_LOCK];
const KEY_SCLK: [Keysym; 1] = [ks::SCROLL_LOCK];
const KEY_KP7: [Keysym; 2] = [ks::KP_HOME, kp_digit(7)];
const KEY_KP8: [Keysym; 2] = [ks::KP_UP, kp_digit(8)];
const KEY_KP9: [Keysym; 2] = [ks::KP_PAGE_UP, kp_digit(9)];
const KEY_KPSU: [Keysym; 1] = [ks::KP_SUBTRACT];
const KEY_KP4: [Keysym; 2] = [ks::KP_LEFT, kp_digit(4)];
const KEY_KP5: [Keysym; 2] = [ks::KP_BEGIN, kp_digit(5)];
const KEY_KP6: [Keysym; 2] = [ks::KP_RIGHT, kp_digit(6)];
const KEY_KPAD: [Keysym; 1] = [ks::KP_ADD];
const KEY_KP1: [Keysym; 2] = [ks::KP_END, kp_digit(1)];
const KEY_KP2: [Keysym; 2] = [ks::KP_DOWN, kp_digit(2)];
const KEY_KP3: [Keysym; 2] = [ks::KP_PAGE_DOWN, kp_digit(3)];
const KEY_KP0: [Keysym; 2] = [ks::KP_INSERT, kp_digit(0)];
const KEY_KPDL: [Keysym; 2] = [ks::KP_DELETE, ks::KP_DECIMAL];
const KEY_KPEN: [Keysym; 1] = [ks::KP_ENTER];
const KEY_RCTL: [Keysym; 1] = [ks::CONTROL_R];
const KEY_KPDV: [Keysym; 1] = [ks::KP_DIVIDE];
const KEY_PRSC: [Keysym; 2] = [ks::PRINT, ks::SYS_REQ];
const KEY_RALT: [Keysym; 1] = [ks::ALT_R];
const KEY_HOME: [Keysym; 1] = [ks::HOME];
const KEY_UP: [Keysym; 1] = [ks::UP];
const KEY_PGUP: [Keysym; 1] = [ks::PAGE_UP];
const KEY_LEFT: [Keysym; 1] = [ks::LEFT];
const KEY_RGHT: [Keysym; 1] = [ks::RIGHT];
const KEY_END: [Keysym; 1] = [ks::END];
const KEY_DOWN: [Keysym; 1] = [ks::DOWN];
const KEY_PGDN: [Keysym; 1] = [ks::PAGE_DOWN];
const KEY_INS: [Keysym; 1] = [ks::INSERT];
const KEY_DELE: [Keysym; 1] = [ks::DELETE];
const KEY_PAUS: [Keysym; 1] = [ks::PAUSE];
const KEY_LWIN: [Keysym; 1] = [ks::SUPER_L];
const KEY_RWIN: [Keysym; 1] = [ks::SUPER_R];
const KEY_MENU: [Keysym; 1] = [ks::MENU];

/// Non-letter, non-function keys of the built-in layout.
const KEYS: &[KeyDef] = &[
    (9, "ESC", ONE_LEVEL_INDEX, &KEY_ESC),
    (10, "AE01", TWO_LEVEL_INDEX, &KEY_AE01),
    (11, "AE02", TWO_LEVEL_INDEX, &KEY_AE02),
    (12, "AE03", TWO_LEVEL_INDEX, &KEY_AE03),
    (13, "AE04", TWO_LEVEL_INDEX, &KEY_AE04),
    (14, "AE05", TWO_LEVEL_INDEX, &KEY_AE05),
    (15, "AE06", TWO_LEVEL_INDEX, &KEY_AE06),
    (16, "AE07", TWO_LEVEL_INDEX, &KEY_AE07),
    (17, "AE08", TWO_LEVEL_INDEX, &KEY_AE08),
    (18, "AE09", TWO_LEVEL_INDEX, &KEY_AE09),
    (19, "AE10", TWO_LEVEL_INDEX, &KEY_AE10),
    (20, "AE11", TWO_LEVEL_INDEX, &KEY_AE11),
    (21, "AE12", TWO_LEVEL_INDEX, &KEY_AE12),
    (22, "BKSP", ONE_LEVEL_INDEX, &KEY_BKSP),
    (23, "TAB", TWO_LEVEL_INDEX, &KEY_TAB),
    (34, "AD11", TWO_LEVEL_INDEX, &KEY_AD11),
    (35, "AD12", TWO_LEVEL_INDEX, &KEY_AD12),
    (36, "RTRN", ONE_LEVEL_INDEX, &KEY_RTRN),
    (37, "LCTL", ONE_LEVEL_INDEX, &KEY_LCTL),
    (47, "AC10", TWO_LEVEL_INDEX, &KEY_AC10),
    (48, "AC11", TWO_LEVEL_INDEX, &KEY_AC11),
    (49, "TLDE", TWO_LEVEL_INDEX, &KEY_TLDE),
    (50, "LFSH", ONE_LEVEL_INDEX, &KEY_LFSH),
    (51, "BKSL", TWO_LEVEL_INDEX, &KEY_BKSL),
    (59, "AB08", TWO_LEVEL_INDEX, &KEY_AB08),
    (60, "AB09", TWO_LEVEL_INDEX, &KEY_AB09),
    (61, "AB10", TWO_LEVEL_INDEX, &KEY_AB10),
    (62, "RTSH", ONE_LEVEL_INDEX, &KEY_RTSH),
    (63, "KPMU", ONE_LEVEL_INDEX, &KEY_KPMU),
    (64, "LALT", TWO_LEVEL_INDEX, &KEY_LALT),
    (65, "SPCE", ONE_LEVEL_INDEX, &KEY_SPCE),
    (66, "CAPS", ONE_LEVEL_INDEX, &KEY_CAPS),
    (77, "NMLK", ONE_LEVEL_INDEX, &KEY_NMLK),
    (78, "SCLK", ONE_LEVEL_INDEX, &KEY_SCLK),
    (79, "KP7", KEYPAD_INDEX, &KEY_KP7),
    (80, "KP8", KEYPAD_INDEX, &KEY_KP8),
    (81, "KP9", KEYPAD_INDEX, &KEY_KP9),
    (82, "KPSU", ONE_LEVEL_INDEX, &KEY_KPSU),
    (83, "KP4", KEYPAD_INDEX, &KEY_KP4),
    (84, "KP5", KEYPAD_INDEX, &KEY_KP5),
    (85, "KP6", KEYPAD_INDEX, &KEY_KP6),
    (86, "KPAD", ONE_LEVEL_INDEX, &KEY_KPAD),
    (87, "KP1", KEYPAD_INDEX, &KEY_KP1),
    (88, "KP2", KEYPAD_INDEX, &KEY_KP2),
    (89, "KP3", KEYPAD_INDEX, &KEY_KP3),
    (90, "KP0", KEYPAD_INDEX, &KEY_KP0),
    (91, "KPDL", KEYPAD_INDEX, &KEY_KPDL),
    (104, "KPEN", ONE_LEVEL_INDEX, &KEY_KPEN),
    (105, "RCTL", ONE_LEVEL_INDEX, &KEY_RCTL),
    (106, "KPDV", ONE_LEVEL_INDEX, &KEY_KPDV),
    (107, "PRSC", TWO_LEVEL_INDEX, &KEY_PRSC),
    (108, "RALT", ONE_LEVEL_INDEX, &KEY_RALT),
    (110, "HOME", ONE_LEVEL_INDEX, &KEY_HOME),
    (111, "UP", ONE_LEVEL_INDEX, &KEY_UP),
    (112, "PGUP", ONE_LEVEL_INDEX, &KEY_PGUP),
    (113, "LEFT", ONE_LEVEL_INDEX, &KEY_LEFT),
    (114, "RGHT", ONE_LEVEL_INDEX, &KEY_RGHT),
    (115, "END", ONE_LEVEL_INDEX, &KEY_END),
    (116, "DOWN", ONE_LEVEL_INDEX, &KEY_DOWN),
    (117, "PGDN", ONE_LEVEL_INDEX, &KEY_PGDN),
    (118, "INS", ONE_LEVEL_INDEX, &KEY_INS),
    (119, "DELE", ONE_LEVEL_INDEX, &KEY_DELE),
    (127, "PAUS", ONE_LEVEL_INDEX, &KEY_PAUS),
    (133, "LWIN", ONE_LEVEL_INDEX, &KEY_LWIN),
    (134, "RWIN", ONE_LEVEL_INDEX, &KEY_RWIN),
    (135, "MENU", ONE_LEVEL_INDEX, &KEY_MENU),
];

/// Letter rows: first keycode, key name prefix, letters.
const LETTER_ROWS: [(Keycode, &str, &str); 3] = [
    (24, "AD", "qwertyuiop"),
    (38, "AC", "asdfghjkl"),
    (52, "AB", "zxcvbnm"),
];

/// Modifier keys: keycode, real modifiers, virtual modifiers, action.
const MODIFIER_KEYS: [(Keycode, u8, u16, fn(u8) -> Action); 11] = [
    (50, mods::SHIFT, 0, set_mods),
    (62, mods::SHIFT, 0, set_mods),
    (66, mods::LOCK, 0, lock_mods),
    (37, mods::CONTROL, 0, set_mods),
    (105, mods::CONTROL, 0, set_mods),
    (64, mods::MOD1, 1 << vmod_index::ALT, set_mods),
    (108, mods::MOD1, 1 << vmod_index::ALT, set_mods),
    (77, mods::MOD2, 1 << vmod_index::NUM_LOCK, lock_mods),
    (133, mods::MOD4, 1 << vmod_index::SUPER, set_mods),
    (134, mods::MOD4, 1 << vmod_index::SUPER, set_mods),
    (78, 0, 1 << vmod_index::SCROLL_LOCK, no_action),
];

fn set_mods(real: u8) -> Action {
    Action::SetMods(ModAction::real(
        action_flags::USE_MOD_MAP_MODS | action_flags::CLEAR_LOCKS,
        real,
    ))
}

fn lock_mods(real: u8) -> Action {
    Action::LockMods(ModAction::real(action_flags::USE_MOD_MAP_MODS, real))
}

fn no_action(_: u8) -> Action {
    Action::NoAction
}

/// Binds one group of `syms` with type `kt_index` to `key`.
fn bind(
    keymap: &mut Keymap,
    key: Keycode,
    kt_index: usize,
    syms: &[Keysym],
) -> Result<(), KeymapError> {
    let slot = keymap.resize_key_symbols(key, syms.len())?;
    slot.copy_from_slice(syms);
    let map = keymap
        .map
        .as_mut()
        .ok_or_else(|| KeymapError::Mismatch("no client map".to_string()))?;
    let entry = &mut map.key_sym_map[usize::from(key)];
    entry.kt_index = [kt_index as u8; NUM_KBD_GROUPS];
    entry.group_info = GroupInfo::new(1, OutOfRange::Wrap);
    entry.width = syms.len() as u8;
    Ok(())
}

/// Builds the built-in keymap, interning its names in `atoms`.
///
/// # Errors
///
/// Only [`KeymapError::AllocationFailure`] in practice; the layout itself is
/// static and consistent.
pub fn default_keymap(atoms: &mut AtomTable) -> Result<Keymap, KeymapError> {
    let mut keymap = Keymap::new(MIN_KEYCODE, MAX_KEYCODE)?;
    keymap.allocate_client_map(map_parts::CLIENT_INFO, NUM_REQUIRED_TYPES)?;
    keymap.allocate_server_map(map_parts::SERVER_INFO, MODIFIER_KEYS.len())?;
    keymap.allocate_names(parts::ALL)?;

    // Virtual modifier bindings.
    if let Some(server) = keymap.server.as_mut() {
        server.vmods[vmod_index::NUM_LOCK] = mods::MOD2;
        server.vmods[vmod_index::ALT] = mods::MOD1;
        server.vmods[vmod_index::SUPER] = mods::MOD4;
    }

    // Canonical types.
    let base = atoms.intern("Base");
    let shift = atoms.intern("Shift");
    let caps = atoms.intern("Caps");
    let number = atoms.intern("Number");
    keymap.add_key_type(KeyType::one_level(atoms.intern("ONE_LEVEL"), base))?;
    keymap.add_key_type(KeyType::two_level(atoms.intern("TWO_LEVEL"), [base, shift]))?;
    keymap.add_key_type(KeyType::alphabetic(atoms.intern("ALPHABETIC"), [base, caps]))?;
    keymap.add_key_type(KeyType::keypad(
        atoms.intern("KEYPAD"),
        [base, number],
        1 << vmod_index::NUM_LOCK,
        mods::MOD2,
    ))?;

    // Symbols and key names.
    let mut key_names: Vec<(Keycode, KeyName)> = Vec::new();
    for &(key, name, kt, syms) in KEYS {
        bind(&mut keymap, key, kt, syms)?;
        key_names.push((key, KeyName::new(name)));
    }
    for (first, prefix, letters) in LETTER_ROWS {
        for (i, c) in letters.chars().enumerate() {
            let key = first + i as u8;
            let upper = c.to_ascii_uppercase();
            bind(&mut keymap, key, ALPHABETIC_INDEX, &[latin1(c), latin1(upper)])?;
            key_names.push((key, KeyName::new(&format!("{prefix}{:02}", i + 1))));
        }
    }
    let function_keys = (67..=76u8).zip(1..=10u8).chain([(95, 11), (96, 12)]);
    for (key, n) in function_keys {
        bind(&mut keymap, key, ONE_LEVEL_INDEX, &[function_key(n)])?;
        key_names.push((key, KeyName::new(&format!("FK{n:02}"))));
    }

    // Modifier map, virtual modifier map, actions, repeat.
    for (key, real, vmods, action) in MODIFIER_KEYS {
        let act = action(real);
        if act != Action::NoAction {
            keymap.resize_key_actions(key, 1)?[0] = act;
        }
        if let Some(map) = keymap.map.as_mut() {
            map.modmap[usize::from(key)] = real;
        }
        if let Some(server) = keymap.server.as_mut() {
            server.vmodmap[usize::from(key)] = vmods;
        }
        keymap.ctrls.per_key_repeat[usize::from(key / 8)] &= !(1 << (key % 8));
    }

    // Indicators.
    let num_lock_vmod = 1 << vmod_index::NUM_LOCK;
    let scroll_lock_vmod = 1 << vmod_index::SCROLL_LOCK;
    keymap.indicators.phys_indicators = 0x7;
    keymap.indicators.maps[led_index::CAPS_LOCK] = IndicatorMap {
        which_mods: im_use::LOCKED,
        mods: ModsDef::real(mods::LOCK),
        ..IndicatorMap::EMPTY
    };
    keymap.indicators.maps[led_index::NUM_LOCK] = IndicatorMap {
        which_mods: im_use::LOCKED,
        mods: ModsDef {
            mask: keymap.mask_for_vmask(num_lock_vmod),
            real_mods: 0,
            vmods: num_lock_vmod,
        },
        ..IndicatorMap::EMPTY
    };
    keymap.indicators.maps[led_index::SCROLL_LOCK] = IndicatorMap {
        which_mods: im_use::LOCKED,
        mods: ModsDef {
            mask: 0,
            real_mods: 0,
            vmods: scroll_lock_vmod,
        },
        ..IndicatorMap::EMPTY
    };

    // Names.
    let names = keymap
        .names
        .as_mut()
        .ok_or_else(|| KeymapError::Mismatch("no names".to_string()))?;
    names.keycodes = atoms.intern("evdev");
    names.symbols = atoms.intern("pc+us");
    names.types = atoms.intern("complete");
    names.compat = atoms.intern("complete");
    names.vmods[vmod_index::NUM_LOCK] = atoms.intern("NumLock");
    names.vmods[vmod_index::ALT] = atoms.intern("Alt");
    names.vmods[vmod_index::SUPER] = atoms.intern("Super");
    names.vmods[vmod_index::SCROLL_LOCK] = atoms.intern("ScrollLock");
    names.indicators[led_index::CAPS_LOCK] = atoms.intern("Caps Lock");
    names.indicators[led_index::NUM_LOCK] = atoms.intern("Num Lock");
    names.indicators[led_index::SCROLL_LOCK] = atoms.intern("Scroll Lock");
    names.groups[0] = atoms.intern("English (US)");
    for (key, name) in key_names {
        names.keys[usize::from(key)] = name;
    }

    keymap.compat.get_or_insert_with(Default::default);
    keymap.ctrls.num_groups = 1;
    debug!(
        min = keymap.min_key_code,
        max = keymap.max_key_code,
        syms = keymap.map.as_ref().map_or(0, |m| m.num_syms),
        "built default keymap"
    );
    Ok(keymap)
}
