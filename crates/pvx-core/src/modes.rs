//! Play modes, dialects, and stealing policy vocabulary.

/// Identifier of a polyphony group. Opaque to the engine; hosts may use
/// any value, including ones near `u64::MAX`.
pub type PolyGroup = u64;

/// The group every voice belongs to unless the host says otherwise.
pub const DEFAULT_GROUP: PolyGroup = 0;

/// How incoming channel messages are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Midi1Dialect {
    /// Plain MIDI 1.0: channel messages are channel-wide.
    #[default]
    Midi1,
    /// MPE: each sounding note occupies its own channel and per-channel
    /// controllers act per-note, except on the global channel.
    Midi1Mpe,
}

/// What a note-on does when its key is already sounding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatedKeyMode {
    /// Each press makes a fresh voice; re-strikes layer.
    #[default]
    MultiVoice,
    /// Re-striking a key that is ringing after release continues the
    /// same physical voice, like a piano string.
    Piano,
}

/// Per-group playback behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    /// Independent voices up to the group limit.
    #[default]
    PolyVoices,
    /// One logical note at a time; behavior refined by [`MonoFeatures`].
    MonoNotes,
}

/// Which voice to sacrifice when a group is out of room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StealingPriority {
    /// Smallest creation counter.
    #[default]
    Oldest,
    /// Largest key number.
    Highest,
    /// Smallest key number.
    Lowest,
}

/// Fallback key choice when a sounding mono key is released while other
/// keys are still held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// Most recently pressed key.
    #[default]
    Latest,
    /// Highest held key.
    Highest,
    /// Lowest held key.
    Lowest,
}

/// Feature bits refining [`PlayMode::MonoNotes`].
///
/// Combine with `|`. The conventional combinations are
/// [`MonoFeatures::NATURAL_MONO`] (retrigger, return to latest) and
/// [`MonoFeatures::NATURAL_LEGATO`] (move the voice, return to latest).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonoFeatures(u64);

impl MonoFeatures {
    /// A new key press triggers a fresh voice.
    pub const MONO_RETRIGGER: MonoFeatures = MonoFeatures(1 << 0);
    /// A new key press moves the existing voice without re-attack.
    pub const MONO_LEGATO: MonoFeatures = MonoFeatures(1 << 1);
    /// On release, fall back to the most recently pressed held key.
    pub const ON_RELEASE_TO_LATEST: MonoFeatures = MonoFeatures(1 << 2);
    /// On release, fall back to the highest held key.
    pub const ON_RELEASE_TO_HIGHEST: MonoFeatures = MonoFeatures(1 << 3);
    /// On release, fall back to the lowest held key.
    pub const ON_RELEASE_TO_LOWEST: MonoFeatures = MonoFeatures(1 << 4);

    /// Retrigger mono with latest-note fallback.
    pub const NATURAL_MONO: MonoFeatures =
        MonoFeatures(Self::MONO_RETRIGGER.0 | Self::ON_RELEASE_TO_LATEST.0);
    /// Legato mono with latest-note fallback.
    pub const NATURAL_LEGATO: MonoFeatures =
        MonoFeatures(Self::MONO_LEGATO.0 | Self::ON_RELEASE_TO_LATEST.0);

    pub const fn empty() -> Self {
        MonoFeatures(0)
    }

    pub const fn contains(self, other: MonoFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when new presses move the existing voice.
    pub const fn legato(self) -> bool {
        self.contains(Self::MONO_LEGATO)
    }

    /// The release fallback policy encoded in these features. Latest
    /// wins when no release bit is set.
    pub fn release_target(self) -> ReleaseTarget {
        if self.contains(Self::ON_RELEASE_TO_HIGHEST) {
            ReleaseTarget::Highest
        } else if self.contains(Self::ON_RELEASE_TO_LOWEST) {
            ReleaseTarget::Lowest
        } else {
            ReleaseTarget::Latest
        }
    }
}

impl core::ops::BitOr for MonoFeatures {
    type Output = MonoFeatures;
    fn bitor(self, rhs: MonoFeatures) -> MonoFeatures {
        MonoFeatures(self.0 | rhs.0)
    }
}
