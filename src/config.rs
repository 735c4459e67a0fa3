use crate::controls::{ControlSurface, OrbitSettings};

pub struct PlayerConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// Multisample the GPU render target (4x) when set.
    pub antialias: bool,
    /// Create the label overlay renderer alongside the primary one.
    pub label_overlay: bool,
    /// Surface that feeds pointer input to the orbit controls.
    pub controls_surface: ControlSurface,
    pub orbit: OrbitSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            pixel_ratio: 1.0,
            antialias: true,
            label_overlay: false,
            controls_surface: ControlSurface::Primary,
            orbit: OrbitSettings::default(),
        }
    }
}

impl PlayerConfig {
    /// MSAA sample count for the GPU renderer: 4 with antialiasing, else 1.
    pub fn sample_count(&self) -> u32 {
        if self.antialias {
            4
        } else {
            1
        }
    }

    /// Controls can only sit on the overlay when the overlay exists.
    pub fn effective_controls_surface(&self) -> ControlSurface {
        match self.controls_surface {
            ControlSurface::Overlay if !self.label_overlay => {
                log::warn!("controls requested on the label overlay, but the overlay is disabled; using the primary surface");
                ControlSurface::Primary
            }
            surface => surface,
        }
    }
}
