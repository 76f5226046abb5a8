use anyhow::Result;

/// Check Input Monitoring permission (required to observe global key events)
///
/// # Errors
/// Returns error if Input Monitoring permission is denied (macOS only)
pub fn check_input_monitoring_permission() -> Result<()> {
    tracing::info!("checking input monitoring permission");

    #[cfg(target_os = "macos")]
    {
        use core_graphics::event::CGEvent;
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // HIDSystemState sources require Input Monitoring
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
            anyhow::anyhow!(
                "Input Monitoring permission denied; enable this app in \
                System Settings → Privacy & Security → Input Monitoring, then restart"
            )
        })?;

        CGEvent::new_keyboard_event(source, 0, true).map_err(|()| {
            anyhow::anyhow!(
                "failed to create CGEvent, Input Monitoring may be restricted; enable this \
                app in System Settings → Privacy & Security → Input Monitoring"
            )
        })?;

        tracing::info!("input monitoring permission granted");
    }

    Ok(())
}
