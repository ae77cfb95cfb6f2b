/// Canonical file locations for the launcher.
///
/// Everything lives next to the launcher executable so the kiosk can be
/// installed by copying one directory:
///   - config.toml          Target paths, written with placeholders on first run.
///   - assets/audio/*.wav   Intro, menu theme and hover clips.
use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "config.toml";
const ASSET_DIR_NAME: &str = "assets";
const AUDIO_DIR_NAME: &str = "audio";

/// Returns the directory containing the running executable, or the working
/// directory if the executable cannot be located.
pub fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the full path to the config file: <install dir>/config.toml
pub fn config_file_path() -> PathBuf {
    install_dir().join(CONFIG_FILE_NAME)
}

/// Returns the directory audio sources are resolved against: <install dir>/assets/audio
pub fn audio_dir() -> PathBuf {
    install_dir().join(ASSET_DIR_NAME).join(AUDIO_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn config_lives_in_install_dir() {
        assert_eq!(config_file_path().parent().unwrap(), install_dir());
    }

    #[test]
    fn audio_dir_is_under_install_dir() {
        let dir = audio_dir();
        assert!(dir.starts_with(install_dir()));
        assert!(dir.ends_with("assets/audio"));
    }
}
