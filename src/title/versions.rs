// title/versions.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Handles converting title version formats, and provides the Wii Menu version tables.

const WII_MENU_TID: u64 = 0x0000000100000002;

// The System Menu's version numbering can't be derived from the TMD version, so these tables
// map every released build.
const WII_MENU_VERSIONS: &[(u16, &str)] = &[
    (0, "Prelaunch"),
    (1, "Prelaunch"),
    (2, "Prelaunch"),
    (64, "1.0J"),
    (33, "1.0U"),
    (34, "1.0E"),
    (128, "2.0J"),
    (97, "2.0U"),
    (130, "2.0E"),
    (162, "2.1E"),
    (192, "2.2J"),
    (193, "2.2U"),
    (194, "2.2E"),
    (224, "3.0J"),
    (225, "3.0U"),
    (226, "3.0E"),
    (256, "3.1J"),
    (257, "3.1U"),
    (258, "3.1E"),
    (288, "3.2J"),
    (289, "3.2U"),
    (290, "3.2E"),
    (352, "3.3J"),
    (353, "3.3U"),
    (354, "3.3E"),
    (326, "3.3K"),
    (384, "3.4J"),
    (385, "3.4U"),
    (386, "3.4E"),
    (390, "3.5K"),
    (416, "4.0J"),
    (417, "4.0U"),
    (418, "4.0E"),
    (448, "4.1J"),
    (449, "4.1U"),
    (450, "4.1E"),
    (454, "4.1K"),
    (480, "4.2J"),
    (481, "4.2U"),
    (482, "4.2E"),
    (486, "4.2K"),
    (512, "4.3J"),
    (513, "4.3U"),
    (514, "4.3E"),
    (518, "4.3K"),
    (4609, "4.3U-Mini"),
    (4610, "4.3E-Mini"),
];

const VWII_MENU_VERSIONS: &[(u16, &str)] = &[
    (512, "vWii-1.0.0J"),
    (513, "vWii-1.0.0U"),
    (514, "vWii-1.0.0E"),
    (544, "vWii-4.0.0J"),
    (545, "vWii-4.0.0U"),
    (546, "vWii-4.0.0E"),
    (608, "vWii-5.2.0J"),
    (609, "vWii-5.2.0U"),
    (610, "vWii-5.2.0E"),
];

fn menu_versions(vwii: bool) -> &'static [(u16, &'static str)] {
    if vwii {
        VWII_MENU_VERSIONS
    } else {
        WII_MENU_VERSIONS
    }
}

/// Converts the decimal version of a title (vXXX, the way versions are stored in the TMD and
/// Ticket) into its standard, human-readable form (vX.X). For the Wii Menu this is a table
/// lookup, since its marketing versions can't be derived from the decimal form; unknown Wii
/// Menu versions return None.
pub fn version_dec_to_standard(version: u16, title_id: u64, vwii: bool) -> Option<String> {
    if title_id == WII_MENU_TID {
        menu_versions(vwii).iter()
            .find(|(dec, _)| *dec == version)
            .map(|(_, name)| name.to_string())
    } else {
        Some(format!("{}.{}", version >> 8, version & 0xFF))
    }
}

/// Converts the standard, human-readable version of a title (vX.X, or a System Menu version
/// like "4.3U") into its decimal form. Returns None if the version string can't be matched.
pub fn version_standard_to_dec(version: &str, title_id: u64, vwii: bool) -> Option<u16> {
    if title_id == WII_MENU_TID {
        menu_versions(vwii).iter()
            .find(|(_, name)| *name == version)
            .map(|(dec, _)| *dec)
    } else {
        let (major, minor) = version.split_once('.')?;
        let major: u16 = major.parse().ok()?;
        let minor: u16 = minor.parse().ok()?;
        if major > 0xFF || minor > 0xFF {
            return None;
        }
        Some((major << 8) | minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_version_lookup() {
        assert_eq!(version_dec_to_standard(513, WII_MENU_TID, false).unwrap(), "4.3U");
        assert_eq!(version_dec_to_standard(513, WII_MENU_TID, true).unwrap(), "vWii-1.0.0U");
        assert_eq!(version_dec_to_standard(9999, WII_MENU_TID, false), None);
    }

    #[test]
    fn test_ordinary_title_version() {
        assert_eq!(version_dec_to_standard(0x0105, 0x0001000848414241, false).unwrap(), "1.5");
        assert_eq!(version_standard_to_dec("1.5", 0x0001000848414241, false).unwrap(), 0x0105);
    }

    #[test]
    fn test_menu_version_reverse_lookup() {
        assert_eq!(version_standard_to_dec("4.3U", WII_MENU_TID, false).unwrap(), 513);
        assert_eq!(version_standard_to_dec("9.9X", WII_MENU_TID, false), None);
    }
}
