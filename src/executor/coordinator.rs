//! Tap point resolution and dispatch.
use std::fmt;
use std::sync::Arc;

use crate::config::{BoundsCheck, OffscreenPolicy, TapConfig};
use crate::errors::{DroidLensError, DroidLensResult};
use crate::executor::input::{ExecResult, InputDispatcher};
use crate::perception::bounds::Bounds;
use crate::perception::element::AppElement;
use crate::perception::geometry::Vector2;

/// What a hierarchy needs to act on its device: the input collaborator and
/// the policy applied before each tap.
#[derive(Clone)]
pub struct DeviceHandle {
    input: Arc<dyn InputDispatcher>,
    tap: TapConfig,
}

impl DeviceHandle {
    pub fn new(input: Arc<dyn InputDispatcher>, tap: TapConfig) -> Self {
        Self { input, tap }
    }

    pub fn input(&self) -> &dyn InputDispatcher {
        self.input.as_ref()
    }

    pub fn tap_config(&self) -> &TapConfig {
        &self.tap
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("tap", &self.tap)
            .finish_non_exhaustive()
    }
}

/// Centre of `bounds`, after the checks `config` enables.
///
/// With the default config this is exactly `bounds.center()`, even for
/// inverted or zero-area rectangles.
pub fn tap_point(bounds: &Bounds, config: &TapConfig) -> DroidLensResult<Vector2> {
    if config.bounds_check == BoundsCheck::Reject {
        if !bounds.is_ordered() {
            return Err(DroidLensError::BoundsRejected(format!(
                "{bounds} has min greater than max"
            )));
        }
        if bounds.is_empty() {
            return Err(DroidLensError::BoundsRejected(format!("{bounds} has zero area")));
        }
    } else if !bounds.is_ordered() || bounds.is_empty() {
        tracing::warn!(%bounds, "tapping degenerate bounds as-is");
    }

    let center = bounds.center();
    let Some(screen) = config.screen else {
        return Ok(center);
    };

    let last = Vector2::new(
        f64::from(screen.width.saturating_sub(1)),
        f64::from(screen.height.saturating_sub(1)),
    );
    let on_screen = center.x >= 0.0 && center.y >= 0.0 && center.x <= last.x && center.y <= last.y;
    if on_screen {
        return Ok(center);
    }

    match config.offscreen {
        OffscreenPolicy::Dispatch => {
            tracing::warn!(x = center.x, y = center.y, "tap point is off screen, dispatching anyway");
            Ok(center)
        }
        OffscreenPolicy::Clamp => {
            let clamped = center.clamp(Vector2::default(), last);
            tracing::debug!(x = clamped.x, y = clamped.y, "tap point clamped to screen");
            Ok(clamped)
        }
        OffscreenPolicy::Reject => Err(DroidLensError::BoundsRejected(format!(
            "tap point ({}, {}) lies outside the {}x{} screen",
            center.x, center.y, screen.width, screen.height
        ))),
    }
}

/// Taps the centre of `element`. The dispatcher's result is returned
/// unchanged; its errors surface as [`DroidLensError::Collaborator`].
pub async fn tap(
    element: &AppElement,
    input: &dyn InputDispatcher,
    config: &TapConfig,
) -> DroidLensResult<ExecResult> {
    let point = tap_point(element.bounds(), config)?;
    tracing::info!(
        x = point.x,
        y = point.y,
        text = %element.text(),
        resource_id = %element.resource_id(),
        "dispatching tap"
    );
    input
        .dispatch_tap(point.x, point.y)
        .await
        .map_err(DroidLensError::Collaborator)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ScreenSize;
    use crate::executor::input::DispatchError;
    use crate::perception::hierarchy::Hierarchy;

    #[derive(Default)]
    struct RecordingInput {
        taps: Mutex<Vec<Vector2>>,
    }

    #[async_trait]
    impl InputDispatcher for RecordingInput {
        async fn dispatch_tap(&self, x: f64, y: f64) -> Result<ExecResult, DispatchError> {
            self.taps.lock().unwrap().push(Vector2::new(x, y));
            Ok(ExecResult::default())
        }
    }

    const SQUARE: &str = r#"<hierarchy><node index="0" text="Square" resource-id="" class="android.view.View" package="com.example" content-desc="" checkable="false" checked="false" clickable="true" enabled="true" focusable="false" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" bounds="[0,0][10,10]"/></hierarchy>"#;

    fn screen(width: u32, height: u32) -> Option<ScreenSize> {
        Some(ScreenSize { width, height })
    }

    #[test]
    fn test_default_config_is_plain_center() {
        let config = TapConfig::default();
        let b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(tap_point(&b, &config).unwrap(), Vector2::new(5.0, 5.0));

        let inverted = Bounds::new(10.0, 10.0, 0.0, 0.0);
        assert_eq!(tap_point(&inverted, &config).unwrap(), Vector2::new(5.0, 5.0));

        let flat = Bounds::new(4.0, 4.0, 4.0, 8.0);
        assert_eq!(tap_point(&flat, &config).unwrap(), Vector2::new(4.0, 6.0));
    }

    #[test]
    fn test_reject_degenerate_bounds() {
        let config = TapConfig {
            bounds_check: BoundsCheck::Reject,
            ..TapConfig::default()
        };
        for b in [Bounds::new(10.0, 0.0, 0.0, 10.0), Bounds::new(0.0, 0.0, 0.0, 10.0)] {
            assert!(matches!(tap_point(&b, &config), Err(DroidLensError::BoundsRejected(_))));
        }
        assert!(tap_point(&Bounds::new(0.0, 0.0, 2.0, 2.0), &config).is_ok());
    }

    #[test]
    fn test_offscreen_policies() {
        let b = Bounds::new(1000.0, 2000.0, 1200.0, 2200.0);
        let mut config = TapConfig {
            screen: screen(1080, 1920),
            ..TapConfig::default()
        };
        assert_eq!(tap_point(&b, &config).unwrap(), Vector2::new(1100.0, 2100.0));

        config.offscreen = OffscreenPolicy::Clamp;
        assert_eq!(tap_point(&b, &config).unwrap(), Vector2::new(1079.0, 1919.0));

        config.offscreen = OffscreenPolicy::Reject;
        assert!(matches!(tap_point(&b, &config), Err(DroidLensError::BoundsRejected(_))));

        let visible = Bounds::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(tap_point(&visible, &config).unwrap(), Vector2::new(50.0, 50.0));
    }

    #[tokio::test]
    async fn test_tap_dispatches_center() {
        let hierarchy = Hierarchy::parse(SQUARE).unwrap();
        let element = hierarchy.find_by_text("Square").unwrap().remove(0);
        let input = RecordingInput::default();
        let result = tap(&element, &input, &TapConfig::default()).await.unwrap();
        assert!(result.success());
        assert_eq!(*input.taps.lock().unwrap(), vec![Vector2::new(5.0, 5.0)]);
    }

    #[tokio::test]
    async fn test_element_tap_goes_through_attached_device() {
        let input = Arc::new(RecordingInput::default());
        let device = DeviceHandle::new(input.clone(), TapConfig::default());
        let hierarchy = Hierarchy::parse(SQUARE).unwrap().with_device(device);
        let element = hierarchy.find_by_text("Square").unwrap().remove(0);
        element.tap().await.unwrap();
        assert_eq!(*input.taps.lock().unwrap(), vec![Vector2::new(5.0, 5.0)]);
    }
}
