//! Operator facing instructions attached to recorded issues

fn lines(src: &[&str]) -> Vec<String> {
    src.iter().map(|it| it.to_string()).collect()
}

/// Installing the transport when it can't be found or won't run
pub fn transport() -> Vec<String> {
    if cfg!(windows) {
        transport_windows()
    } else {
        transport_unix()
    }
}

pub fn transport_windows() -> Vec<String> {
    lines(&[
        "1. Download Android Platform Tools from: https://developer.android.com/studio/releases/platform-tools",
        "2. Extract the zip file",
        "3. Add the platform-tools folder to your system PATH",
        "4. Or place adb.exe in the same folder as this application",
        "5. Restart this application",
    ])
}

pub fn transport_unix() -> Vec<String> {
    lines(&[
        "1. Install ADB using your package manager:",
        "   - Ubuntu/Debian: sudo apt-get install android-tools-adb",
        "   - Fedora: sudo dnf install android-tools",
        "   - Arch: sudo pacman -S android-tools",
        "2. Or download from: https://developer.android.com/studio/releases/platform-tools",
        "3. Make sure ADB is in your PATH",
        "4. Restart this application",
    ])
}

pub fn device() -> Vec<String> {
    lines(&[
        "1. Connect your Android device to your computer via USB",
        "2. On your Android device:",
        "   - Go to Settings > About Phone",
        "   - Tap 'Build Number' 7 times to enable Developer Options",
        "   - Go to Settings > System > Developer Options",
        "   - Enable 'USB Debugging'",
        "3. When prompted on your device, allow USB debugging",
        "4. Make sure you're using a data cable (not just charging)",
        "5. Try a different USB port or cable if issues persist",
        "6. On some devices, you may need to select 'File Transfer' mode",
    ])
}

/// A direct pull of `artifact` failed on every known path
pub fn extraction(artifact: &str) -> Vec<String> {
    vec![
        format!("1. The {} database may not exist on this device", artifact),
        "2. Make sure the device is rooted (required for accessing /data/data/)".into(),
        "3. Try running: adb root (in a terminal)".into(),
        "4. Verify the app is installed (e.g., Chrome for browser history)".into(),
        "5. Some devices may have different database paths".into(),
        "6. Check if the data exists using: adb shell ls /data/data/".into(),
        "7. For non-rooted devices, run: droidex acquire --strategy backup".into(),
    ]
}

/// The backup of `package` (if known) didn't yield the artifact
pub fn backup(package: Option<&str>) -> Vec<String> {
    vec![
        "1. Make sure you approved the backup on your Android device".into(),
        "2. The backup prompt appears on your device screen - tap 'Back up my data'".into(),
        "3. If no prompt appeared, the app may not support backup".into(),
        match package {
            Some(p) => format!(
                "4. Verify the app is installed: adb shell pm list packages | grep {}",
                p
            ),
            None => "4. Verify the apps are installed: adb shell pm list packages".into(),
        },
        "5. Some apps may not allow backup (check app settings)".into(),
        "6. Try unlocking your device screen during backup".into(),
        "7. Make sure USB debugging is enabled and authorized".into(),
        "8. If backup fails, you may need to root the device for direct extraction".into(),
    ]
}

pub fn root_unavailable() -> Vec<String> {
    lines(&[
        "1. Direct extraction of /data/data/ requires a rooted device or a userdebug build",
        "2. Try running: adb root (in a terminal)",
        "3. If the device has su installed, approve the root prompt on the device",
        "4. For non-rooted devices, run: droidex acquire --strategy backup",
    ])
}

pub fn verification(artifact: &str) -> Vec<String> {
    vec![
        format!("1. The extracted {} file may be incomplete or encrypted", artifact),
        "2. Check whether a -journal or -wal file exists next to the database".into(),
        "3. Re-run the extraction with the device unlocked".into(),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lists_are_ordered() {
        for list in [transport_unix(), transport_windows(), device(), extraction("sms")] {
            assert!(list[0].starts_with("1. "));
        }
        assert!(extraction("chrome")[0].contains("chrome"));
        assert!(backup(Some("com.android.chrome"))[3].ends_with("grep com.android.chrome"));
        assert!(!backup(None)[3].contains("grep"));
    }
}
