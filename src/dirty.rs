use bitflags::bitflags;

bitflags! {
    /// Reasons an entity's skinned buffers are stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        const ANIMATION = 1 << 0;
        const LIGHTING  = 1 << 1;
        const TRANSFORM = 1 << 2;
        const MATERIAL  = 1 << 3;
        const TEXTURE   = 1 << 4;
        const ALL = Self::ANIMATION.bits()
            | Self::LIGHTING.bits()
            | Self::TRANSFORM.bits()
            | Self::MATERIAL.bits()
            | Self::TEXTURE.bits();
    }
}

impl DirtyFlags {
    /// The subset a child receives when its parent is invalidated with `self`.
    /// Children whose placement already derives from the parent never take TRANSFORM.
    pub fn for_child(self, derives_transform: bool) -> Self {
        if derives_transform {
            self.difference(Self::TRANSFORM)
        } else {
            self
        }
    }

    /// Only ANIMATION, optionally accompanied by TRANSFORM.
    pub fn is_animation_only(self) -> bool {
        self.contains(Self::ANIMATION) && (self - Self::TRANSFORM) == Self::ANIMATION
    }
}
