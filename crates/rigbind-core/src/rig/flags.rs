//! Bone flag and display layer bitmasks.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-bone behavior flags.
    ///
    /// Serialized as text, e.g. `"DEF | CON"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BoneFlags: u32 {
        /// Deforms the mesh.
        const DEF = 1 << 0;
        /// Head is connected to the parent's tail.
        const CON = 1 << 1;
        /// Restricted: not selectable for posing.
        const RES = 1 << 2;
        /// Drawn as wire.
        const WIR = 1 << 3;
        /// Does not inherit parent location.
        const NOLOC = 1 << 4;
        /// Locked against editing.
        const LOCK = 1 << 5;
        /// Cyclic offset allowed.
        const NOCYC = 1 << 6;
        /// Hidden.
        const HID = 1 << 7;
        /// Does not inherit parent rotation.
        const NOROT = 1 << 8;
        /// Inherits parent scale.
        const SCALE = 1 << 9;
        /// Location channels stay unlocked even when parented.
        const NOLOCK = 1 << 10;
    }
}

bitflags! {
    /// 32 display layers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Layers: u32 {
        const MAIN = 1 << 0;
        const SPINE = 1 << 1;
        const HEAD = 1 << 2;
        const FACE = 1 << 3;
        const ARM_L = 1 << 4;
        const ARM_R = 1 << 5;
        const HAND_L = 1 << 6;
        const HAND_R = 1 << 7;
        const LEG_L = 1 << 8;
        const LEG_R = 1 << 9;
        const FINGER = 1 << 10;
        const MUSCLE = 1 << 11;
        const DEFORM = 1 << 29;
        const HELPER = 1 << 30;

        const _ = !0;
    }
}

impl BoneFlags {
    /// Deform copies keep only these flags from their source.
    pub fn for_deform_copy(self) -> BoneFlags {
        (self & (BoneFlags::CON | BoneFlags::NOLOCK)) | BoneFlags::DEF
    }
}

impl Layers {
    /// Layer mask with only layer `index` (0..32) set.
    pub fn layer(index: u32) -> Option<Layers> {
        (index < 32).then(|| Layers::from_bits_retain(1 << index))
    }

    /// Indices of the set layers, ascending.
    pub fn indices(&self) -> Vec<u32> {
        (0..32).filter(|i| self.bits() & (1 << i) != 0).collect()
    }
}
