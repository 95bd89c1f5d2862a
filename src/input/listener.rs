//! evdev keyboard listener.
//!
//! Reads `/dev/input/event*` keyboards (membership in the `input` group or a
//! udev rule is needed) and feeds each key transition into the [`InputRouter`].
//! One reader thread per device keeps per-device ordering intact.

use super::events::{KeyCode, KeyTransition};
use super::router::InputRouter;
use anyhow::{Result, anyhow};
use evdev::{Device, InputEventKind, Key};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::thread;

/// A keyboard found during enumeration.
#[derive(Debug, Clone)]
pub struct KeyboardDevice {
    pub path: PathBuf,
    pub name: String,
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE))
}

/// Lists keyboards, leaving out the virtual device named `own_device_name`.
pub fn enumerate_keyboards(own_device_name: &str) -> Vec<(KeyboardDevice, Device)> {
    let mut keyboards = Vec::new();
    for (path, device) in evdev::enumerate() {
        let name = device.name().unwrap_or("Unknown").to_string();
        if name == own_device_name {
            debug!("Skipping own virtual device {}", path.display());
            continue;
        }
        if !is_keyboard(&device) {
            continue;
        }
        keyboards.push((KeyboardDevice { path, name }, device));
    }
    keyboards
}

/// Spawns one detached reader thread per keyboard.
///
/// Threads exit when the controller starts shutting down (checked after every
/// batch of events) or when their device disappears.
///
/// # Errors
/// Fails if no readable keyboard was found.
pub fn spawn_keyboard_listeners(
    router: InputRouter,
    own_device_name: &str,
) -> Result<Vec<KeyboardDevice>> {
    let keyboards = enumerate_keyboards(own_device_name);
    if keyboards.is_empty() {
        return Err(anyhow!(
            "No readable keyboard found under /dev/input (is the user in the 'input' group?)"
        ));
    }

    let mut spawned = Vec::with_capacity(keyboards.len());
    for (info, device) in keyboards {
        info!("Listening on {} ({})", info.name, info.path.display());
        let router = router.clone();
        let thread_info = info.clone();
        let builder = thread::Builder::new().name(format!("keys:{}", info.path.display()));
        match builder.spawn(move || read_device(device, thread_info, router)) {
            Ok(_) => spawned.push(info),
            Err(e) => warn!("Failed to spawn reader for {}: {}", info.path.display(), e),
        }
    }

    if spawned.is_empty() {
        return Err(anyhow!("Could not start any keyboard reader"));
    }
    Ok(spawned)
}

fn read_device(mut device: Device, info: KeyboardDevice, router: InputRouter) {
    loop {
        match device.fetch_events() {
            Ok(events) => {
                for event in events {
                    let InputEventKind::Key(key) = event.kind() else {
                        continue;
                    };
                    let Some(transition) = KeyTransition::from_evdev_value(event.value()) else {
                        continue;
                    };
                    router.on_key(KeyCode(key.code()), transition);
                }
            }
            Err(e) => {
                if !router.mode().is_shutting_down() {
                    warn!("Stopped reading {}: {}", info.path.display(), e);
                }
                return;
            }
        }

        if router.mode().is_shutting_down() {
            debug!("Reader for {} exiting", info.path.display());
            return;
        }
    }
}
