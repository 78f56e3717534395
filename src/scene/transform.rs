use glam::{Affine3A, Mat4, Quat, Vec3};

/// Local and world transforms of a scene node.
///
/// The world transform is derived; `dirty` means it no longer reflects the
/// local transform or an ancestor's. Flags are set eagerly on every local
/// edit and reparent, and cleared by the scene graph's propagation pass.
#[derive(Debug, Clone)]
pub struct Transform {
    local: Affine3A,
    global: Affine3A,
    dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        local: Affine3A::IDENTITY,
        global: Affine3A::IDENTITY,
        dirty: false,
    };

    #[must_use]
    pub fn from_local(local: Affine3A) -> Self {
        Self {
            local,
            global: Affine3A::IDENTITY,
            dirty: true,
        }
    }

    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::from_local(Affine3A::from_scale_rotation_translation(
            scale,
            rotation,
            translation,
        ))
    }

    #[must_use]
    pub fn local(&self) -> Affine3A {
        self.local
    }

    /// Last propagated world transform. Stale while [`Self::is_dirty`].
    #[must_use]
    pub fn global(&self) -> Affine3A {
        self.global
    }

    #[must_use]
    pub fn global_matrix(&self) -> Mat4 {
        Mat4::from(self.global)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_local(&mut self, local: Affine3A) {
        self.local = local;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Recomputes the world transform from the parent's and clears the flag.
    pub fn propagate(&mut self, parent_global: Affine3A) {
        self.global = parent_global * self.local;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_edit_marks_dirty_until_propagated() {
        let mut transform = Transform::IDENTITY;
        assert!(!transform.is_dirty());

        transform.set_local(Affine3A::from_translation(Vec3::X));
        assert!(transform.is_dirty());

        transform.propagate(Affine3A::from_translation(Vec3::Y));
        assert!(!transform.is_dirty());
        let expected = Affine3A::from_translation(Vec3::X + Vec3::Y);
        assert!(transform.global().abs_diff_eq(expected, 1e-6));
    }
}
