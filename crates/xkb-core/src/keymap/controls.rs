//! Feature controls: enable bits, AccessX timings and options.

use super::{GroupInfo, ModsDef};

/// Boolean and non-boolean control bits.
pub mod ctrls {
    pub const REPEAT_KEYS: u32 = 1 << 0;
    pub const SLOW_KEYS: u32 = 1 << 1;
    pub const BOUNCE_KEYS: u32 = 1 << 2;
    pub const STICKY_KEYS: u32 = 1 << 3;
    pub const MOUSE_KEYS: u32 = 1 << 4;
    pub const MOUSE_KEYS_ACCEL: u32 = 1 << 5;
    pub const ACCESSX_KEYS: u32 = 1 << 6;
    pub const ACCESSX_TIMEOUT: u32 = 1 << 7;
    pub const ACCESSX_FEEDBACK: u32 = 1 << 8;
    pub const AUDIBLE_BELL: u32 = 1 << 9;
    pub const OVERLAY1: u32 = 1 << 10;
    pub const OVERLAY2: u32 = 1 << 11;
    pub const IGNORE_GROUP_LOCK: u32 = 1 << 12;
    pub const GROUPS_WRAP: u32 = 1 << 27;
    pub const INTERNAL_MODS: u32 = 1 << 28;
    pub const IGNORE_LOCK_MODS: u32 = 1 << 29;
    pub const PER_KEY_REPEAT: u32 = 1 << 30;
    pub const CONTROLS_ENABLED: u32 = 1 << 31;

    /// Slow keys plus bounce keys ("keyboard response group").
    pub const KRG: u32 = SLOW_KEYS | BOUNCE_KEYS;
    pub const ACCESSX_OPTIONS: u32 = STICKY_KEYS | ACCESSX_FEEDBACK;
    pub const ALL_BOOLEAN: u32 = 0x0000_1fff;
}

/// AccessX option bits.
pub mod ax_opts {
    pub const SK_PRESS_FB: u16 = 1 << 0;
    pub const SK_ACCEPT_FB: u16 = 1 << 1;
    pub const FEATURE_FB: u16 = 1 << 2;
    pub const SLOW_WARN_FB: u16 = 1 << 3;
    pub const INDICATOR_FB: u16 = 1 << 4;
    pub const STICKY_KEYS_FB: u16 = 1 << 5;
    pub const TWO_KEYS: u16 = 1 << 6;
    pub const LATCH_TO_LOCK: u16 = 1 << 7;
    pub const SK_RELEASE_FB: u16 = 1 << 8;
    pub const SK_REJECT_FB: u16 = 1 << 9;
    pub const BK_REJECT_FB: u16 = 1 << 10;
    pub const DUMB_BELL: u16 = 1 << 11;

    /// Sticky keys behaviour options.
    pub const SK_OPTIONS: u16 = TWO_KEYS | LATCH_TO_LOCK;
    /// Feedback options (everything except the sticky key options).
    pub const FB_OPTIONS: u16 = ALL & !SK_OPTIONS;
    pub const ALL: u16 = 0x0fff;
}

/// Default autorepeat delay in milliseconds.
pub const DEFAULT_REPEAT_DELAY: u16 = 660;
/// Default autorepeat interval in milliseconds.
pub const DEFAULT_REPEAT_INTERVAL: u16 = 40;
/// Default AccessX timeout in seconds.
pub const DEFAULT_AX_TIMEOUT: u16 = 120;

/// Keyboard feature controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    /// Default mouse-keys button.
    pub mk_dflt_btn: u8,
    /// Number of keyboard groups in use.
    pub num_groups: u8,
    /// Global group out-of-range policy (group count bits unused).
    pub groups_wrap: GroupInfo,
    /// Modifiers consumed by the server itself.
    pub internal: ModsDef,
    /// Modifiers ignored when matching grabs.
    pub ignore_lock: ModsDef,
    pub enabled_ctrls: u32,
    pub repeat_delay: u16,
    pub repeat_interval: u16,
    pub slow_keys_delay: u16,
    pub debounce_delay: u16,
    pub mk_delay: u16,
    pub mk_interval: u16,
    pub mk_time_to_max: u16,
    pub mk_max_speed: u16,
    pub mk_curve: i16,
    pub ax_options: u16,
    /// Seconds of inactivity before the AccessX timeout fires.
    pub ax_timeout: u16,
    pub axt_opts_mask: u16,
    pub axt_opts_values: u16,
    pub axt_ctrls_mask: u32,
    pub axt_ctrls_values: u32,
    /// Per-key autorepeat bitmap, one bit per keycode.
    pub per_key_repeat: [u8; 32],
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            mk_dflt_btn: 1,
            num_groups: 1,
            groups_wrap: GroupInfo(GroupInfo::WRAP),
            internal: ModsDef::default(),
            ignore_lock: ModsDef::default(),
            enabled_ctrls: ctrls::ACCESSX_TIMEOUT
                | ctrls::REPEAT_KEYS
                | ctrls::MOUSE_KEYS_ACCEL
                | ctrls::AUDIBLE_BELL
                | ctrls::IGNORE_GROUP_LOCK
                | ctrls::ACCESSX_FEEDBACK,
            repeat_delay: DEFAULT_REPEAT_DELAY,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
            slow_keys_delay: 300,
            debounce_delay: 300,
            mk_delay: 160,
            mk_interval: 40,
            mk_time_to_max: 30,
            mk_max_speed: 30,
            mk_curve: 500,
            ax_options: ax_opts::ALL
                & !(ax_opts::INDICATOR_FB | ax_opts::SK_RELEASE_FB | ax_opts::SK_REJECT_FB),
            ax_timeout: DEFAULT_AX_TIMEOUT,
            axt_opts_mask: ax_opts::INDICATOR_FB,
            axt_opts_values: 0,
            axt_ctrls_mask: ctrls::KRG | ctrls::STICKY_KEYS | ctrls::MOUSE_KEYS,
            axt_ctrls_values: 0,
            per_key_repeat: [0xff; 32],
        }
    }
}

impl Controls {
    /// Returns `true` if every bit of `mask` is enabled.
    pub fn is_enabled(&self, mask: u32) -> bool {
        self.enabled_ctrls & mask == mask
    }

    /// Returns `true` when AccessX feedback is on and `option` is selected.
    pub fn need_feedback(&self, option: u16) -> bool {
        self.enabled_ctrls & ctrls::ACCESSX_FEEDBACK != 0 && self.ax_options & option != 0
    }

    /// Returns `true` if `key` autorepeats.
    pub fn key_repeats(&self, key: u8) -> bool {
        self.per_key_repeat[usize::from(key / 8)] & (1 << (key % 8)) != 0
    }

    /// Control bits whose settings differ between `self` (old) and `new`.
    ///
    /// Each non-boolean setting is attributed to the control it belongs to,
    /// and a changed enable mask sets [`ctrls::CONTROLS_ENABLED`].
    pub fn changed_controls(&self, new: &Controls) -> u32 {
        let mut changed = 0;
        if self.mk_dflt_btn != new.mk_dflt_btn {
            changed |= ctrls::MOUSE_KEYS;
        }
        if self.repeat_delay != new.repeat_delay || self.repeat_interval != new.repeat_interval {
            changed |= ctrls::REPEAT_KEYS;
        }
        if self.per_key_repeat != new.per_key_repeat {
            changed |= ctrls::PER_KEY_REPEAT;
        }
        if self.slow_keys_delay != new.slow_keys_delay {
            changed |= ctrls::SLOW_KEYS;
        }
        if self.debounce_delay != new.debounce_delay {
            changed |= ctrls::BOUNCE_KEYS;
        }
        if self.mk_delay != new.mk_delay
            || self.mk_interval != new.mk_interval
            || self.mk_max_speed != new.mk_max_speed
            || self.mk_time_to_max != new.mk_time_to_max
            || self.mk_curve != new.mk_curve
        {
            changed |= ctrls::MOUSE_KEYS_ACCEL;
        }
        if self.ax_options != new.ax_options {
            changed |= ctrls::ACCESSX_KEYS;
        }
        let options = self.ax_options ^ new.ax_options;
        if options & ax_opts::SK_OPTIONS != 0 {
            changed |= ctrls::STICKY_KEYS;
        }
        if options & ax_opts::FB_OPTIONS != 0 {
            changed |= ctrls::ACCESSX_FEEDBACK;
        }
        if self.ax_timeout != new.ax_timeout
            || self.axt_ctrls_mask != new.axt_ctrls_mask
            || self.axt_ctrls_values != new.axt_ctrls_values
            || self.axt_opts_mask != new.axt_opts_mask
            || self.axt_opts_values != new.axt_opts_values
        {
            changed |= ctrls::ACCESSX_TIMEOUT;
        }
        if self.internal != new.internal {
            changed |= ctrls::INTERNAL_MODS;
        }
        if self.ignore_lock != new.ignore_lock {
            changed |= ctrls::IGNORE_LOCK_MODS;
        }
        if self.groups_wrap != new.groups_wrap {
            changed |= ctrls::GROUPS_WRAP;
        }
        if self.enabled_ctrls != new.enabled_ctrls {
            changed |= ctrls::CONTROLS_ENABLED;
        }
        changed
    }
}
