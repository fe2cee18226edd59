use crate::ViewerConfig;

/// Owns the zoom factor. Every mutation lands inside `[min_scale, max_scale]`;
/// callers follow each change with a full render pass.
#[derive(Debug, Clone)]
pub struct ScaleManager {
    scale: f32,
    step: f32,
    min: f32,
    max: f32,
    fit_max: f32,
    fit_padding: f32,
}

impl ScaleManager {
    pub const DEFAULT_SCALE: f32 = 1.0;

    pub fn new(config: &ViewerConfig) -> Self {
        let mut manager = Self {
            scale: Self::DEFAULT_SCALE,
            step: config.zoom_step,
            min: config.min_scale,
            max: config.max_scale,
            fit_max: config.fit_max_scale,
            fit_padding: config.fit_padding,
        };
        manager.scale = manager.clamp(Self::DEFAULT_SCALE);
        manager
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.scale = self.clamp((self.scale * self.step).min(self.max));
        self.scale
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.scale = self.clamp((self.scale / self.step).max(self.min));
        self.scale
    }

    /// `page_width` is the native width of page 1 at scale 1.0.
    pub fn fit_to_width(&mut self, container_width: f32, page_width: f32) -> f32 {
        if !page_width.is_finite() || page_width <= 0.0 {
            return self.scale;
        }
        let available = container_width - self.fit_padding;
        let fitted = (available / page_width).min(self.fit_max);
        self.scale = self.clamp(fitted);
        self.scale
    }

    pub fn reset(&mut self) {
        self.scale = self.clamp(Self::DEFAULT_SCALE);
    }

    /// Never panics, even on inverted or NaN bounds from an unvalidated
    /// config.
    fn clamp(&self, scale: f32) -> f32 {
        if scale.is_nan() {
            return self.min;
        }
        scale.min(self.max).max(self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manager() -> ScaleManager {
        ScaleManager::new(&ViewerConfig::default())
    }

    #[test]
    fn two_zoom_ins_from_default() {
        let mut scale = manager();
        scale.zoom_in();
        scale.zoom_in();
        assert!((scale.scale() - 1.44).abs() < 1e-5);
        assert_eq!(scale.zoom_percent(), 144);
    }

    #[test]
    fn zoom_saturates_at_bounds() {
        let mut scale = manager();
        for _ in 0..20 {
            scale.zoom_in();
        }
        assert_eq!(scale.scale(), 3.0);
        for _ in 0..40 {
            scale.zoom_out();
        }
        assert_eq!(scale.scale(), 0.3);
    }

    #[test]
    fn fit_to_width_uses_padding_and_cap() {
        let mut scale = manager();
        // (692 - 80) / 612 = 1.0
        assert!((scale.fit_to_width(692.0, 612.0) - 1.0).abs() < 1e-5);
        assert_eq!(scale.fit_to_width(100_000.0, 612.0), 2.0);
        assert_eq!(scale.fit_to_width(40.0, 612.0), 0.3);
    }

    #[test]
    fn fit_to_width_ignores_degenerate_pages() {
        let mut scale = manager();
        scale.zoom_in();
        let before = scale.scale();
        assert_eq!(scale.fit_to_width(800.0, 0.0), before);
        assert_eq!(scale.fit_to_width(800.0, f32::NAN), before);
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let config = ViewerConfig {
            min_scale: 2.0,
            max_scale: 0.5,
            ..ViewerConfig::default()
        };
        let mut scale = ScaleManager::new(&config);
        scale.zoom_in();
        scale.zoom_out();
        assert!(scale.fit_to_width(692.0, 612.0).is_finite());
    }

    proptest! {
        #[test]
        fn zoom_sequences_stay_in_bounds(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut scale = manager();
            for zoom_in in ops {
                let value = if zoom_in { scale.zoom_in() } else { scale.zoom_out() };
                prop_assert!((0.3..=3.0).contains(&value));
            }
        }

        #[test]
        fn fit_never_exceeds_cap(container in 0.0f32..1.0e7, page in 1.0f32..5000.0) {
            let mut scale = manager();
            let value = scale.fit_to_width(container, page);
            prop_assert!(value <= 2.0);
            prop_assert!(value >= 0.3);
        }
    }
}
