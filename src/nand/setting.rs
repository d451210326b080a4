// nand/setting.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of the obfuscated setting.txt file from the Wii Menu's data.

use thiserror::Error;

const SETTING_KEY: u32 = 0x73B5DBFA;
const SETTING_FILE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum SettingError {
    #[error("setting.txt is missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("setting.txt data is not in a valid format")]
    IO(#[from] std::io::Error),
}

// setting.txt is XOR'd with a rolling key rather than actually encrypted, so one pass handles
// both directions.
fn crypt(data: &[u8]) -> Vec<u8> {
    let mut key = SETTING_KEY;
    data.iter().map(|byte| {
        let out = byte ^ (key & 0xFF) as u8;
        key = key.rotate_left(1);
        out
    }).collect()
}

/// A parsed setting.txt file, holding the console settings the Wii Menu reads at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingTxt {
    pub area: String,
    pub model: String,
    pub dvd: u8,
    pub mpch: String,
    pub code: String,
    pub serial_number: String,
    pub video: String,
    pub game: String,
}

impl SettingTxt {
    /// Creates a new SettingTxt instance from the binary data of an obfuscated setting.txt file.
    pub fn from_bytes(data: &[u8]) -> Result<SettingTxt, SettingError> {
        let dec_data = crypt(&data[..data.len().min(SETTING_FILE_SIZE)]);
        let text = String::from_utf8_lossy(&dec_data);
        // The deobfuscated file ends in zero padding, so only keep up to the final newline.
        let text = match text.rfind('\n') {
            Some(end) => &text[..=end],
            None => &text[..],
        };
        SettingTxt::from_string(text)
    }

    /// Creates a new SettingTxt instance from the deobfuscated text of a setting.txt file.
    pub fn from_string(text: &str) -> Result<SettingTxt, SettingError> {
        let lookup = |key: &'static str| -> Result<String, SettingError> {
            text.lines()
                .filter_map(|line| line.split_once('='))
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.trim_end().to_string())
                .ok_or(SettingError::MissingKey(key))
        };
        Ok(SettingTxt {
            area: lookup("AREA")?,
            model: lookup("MODEL")?,
            dvd: lookup("DVD")?.parse().unwrap_or(0),
            mpch: lookup("MPCH")?,
            code: lookup("CODE")?,
            serial_number: lookup("SERNO")?,
            video: lookup("VIDEO")?,
            game: lookup("GAME")?,
        })
    }

    /// Dumps the deobfuscated data in a SettingTxt instance into a string.
    pub fn to_string(&self) -> String {
        let mut text = String::new();
        text += &format!("AREA={}\r\n", self.area);
        text += &format!("MODEL={}\r\n", self.model);
        text += &format!("DVD={}\r\n", self.dvd);
        text += &format!("MPCH={}\r\n", self.mpch);
        text += &format!("CODE={}\r\n", self.code);
        text += &format!("SERNO={}\r\n", self.serial_number);
        text += &format!("VIDEO={}\r\n", self.video);
        text += &format!("GAME={}\r\n", self.game);
        text
    }

    /// Obfuscates and dumps the data in a SettingTxt instance back into the 256-byte binary
    /// form that can be written to a file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc_data = crypt(self.to_string().as_bytes());
        enc_data.resize(SETTING_FILE_SIZE, 0);
        enc_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_setting() -> SettingTxt {
        SettingTxt {
            area: "USA".to_string(),
            model: "RVL-001(USA)".to_string(),
            dvd: 0,
            mpch: "0x7FFE".to_string(),
            code: "LU".to_string(),
            serial_number: "101550461".to_string(),
            video: "NTSC".to_string(),
            game: "US".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let setting = sample_setting();
        let data = setting.to_bytes();
        assert_eq!(data.len(), SETTING_FILE_SIZE);
        // The obfuscated data must not contain the cleartext.
        assert!(!data.windows(4).any(|window| window == b"AREA"));
        assert_eq!(SettingTxt::from_bytes(&data).unwrap(), setting);
    }

    #[test]
    fn test_from_string() {
        let setting = SettingTxt::from_string(&sample_setting().to_string()).unwrap();
        assert_eq!(setting.serial_number, "101550461");
        assert_eq!(setting.video, "NTSC");
    }

    #[test]
    fn test_missing_key() {
        assert!(matches!(
            SettingTxt::from_string("AREA=USA\r\n"),
            Err(SettingError::MissingKey("MODEL"))
        ));
    }
}
