//! Debug groups and the device debug-message side channel.

use std::sync::Arc;

use crate::device::{DebugKind, DebugMessage, DebugSeverity, Device};

/// Pushes a named debug group on creation and pops it on drop.
pub struct DebugGroup<'a> {
    device: &'a dyn Device,
}

impl<'a> DebugGroup<'a> {
    pub fn push(device: &'a dyn Device, name: &str) -> Self {
        device.push_debug_group(name);
        Self { device }
    }
}

impl Drop for DebugGroup<'_> {
    fn drop(&mut self) {
        self.device.pop_debug_group();
    }
}

fn level_for(message: &DebugMessage) -> log::Level {
    match (message.kind, message.severity) {
        (DebugKind::PushGroup | DebugKind::PopGroup, _) => log::Level::Trace,
        (DebugKind::Error, _) | (_, DebugSeverity::High) => log::Level::Error,
        (_, DebugSeverity::Medium) => log::Level::Warn,
        (_, DebugSeverity::Low) => log::Level::Info,
        (_, DebugSeverity::Notification) => log::Level::Debug,
    }
}

/// Forward device debug messages to the `log` facade under the `umbra_gpu::device` target.
pub fn install_log_callback(device: &Arc<dyn Device>) {
    device.set_debug_callback(Some(Box::new(|message: &DebugMessage| {
        log::log!(
            target: "umbra_gpu::device",
            level_for(message),
            "[{:?}/{:?}/{:?}] {}",
            message.source,
            message.kind,
            message.severity,
            message.message
        );
    })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DebugSource;
    use crate::headless::{Command, HeadlessDevice};

    #[test]
    fn group_guard_pops_on_drop() {
        let device = HeadlessDevice::new(4, 4);
        {
            let _outer = DebugGroup::push(&*device, "outer");
            let _inner = DebugGroup::push(&*device, "inner");
            assert_eq!(device.debug_groups(), vec!["outer".to_string(), "inner".to_string()]);
        }
        assert!(device.debug_groups().is_empty());
        let pops = device.commands().iter().filter(|c| matches!(c, Command::PopGroup)).count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn severity_maps_to_log_level() {
        let msg = |kind, severity| DebugMessage {
            source: DebugSource::Api,
            kind,
            severity,
            id: 0,
            message: String::new(),
        };
        assert_eq!(level_for(&msg(DebugKind::Error, DebugSeverity::Low)), log::Level::Error);
        assert_eq!(level_for(&msg(DebugKind::Performance, DebugSeverity::Medium)), log::Level::Warn);
        assert_eq!(level_for(&msg(DebugKind::PushGroup, DebugSeverity::Notification)), log::Level::Trace);
    }
}
