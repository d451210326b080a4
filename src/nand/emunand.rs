// nand/emunand.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements managing Wii EmuNANDs: directory layouts that mirror the console's real NAND.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;

use crate::nand::uid;
use crate::title::{cert, content, ticket, tmd, Title, TitleError};

#[derive(Debug, Error)]
pub enum EmuNandError {
    #[error("the specified title is not installed to the EmuNAND")]
    TitleNotInstalled,
    #[error("the EmuNAND requires the directory `{0}`, but a file with that name already exists")]
    DirectoryNameConflict(String),
    #[error("specified EmuNAND root does not exist")]
    RootNotFound,
    #[error("uid.sys processing error")]
    UidSys(#[from] uid::UidSysError),
    #[error("certificate processing error")]
    Cert(#[from] cert::CertError),
    #[error("TMD processing error")]
    Tmd(#[from] tmd::TmdError),
    #[error("Ticket processing error")]
    Ticket(#[from] ticket::TicketError),
    #[error("content processing error")]
    Content(#[from] content::ContentError),
    #[error("shared content map processing error")]
    SharedContentMap(#[from] content::SharedContentMapError),
    #[error("title processing error")]
    Title(#[from] TitleError),
    #[error("io error occurred during EmuNAND operation")]
    IO(#[from] std::io::Error),
}

// The directories that make up the skeleton of a NAND filesystem.
const EMUNAND_DIRS: [&str; 9] = [
    "import", "meta", "shared1", "shared2", "sys", "ticket", "title", "tmp", "wfs",
];

/// The titles installed to an EmuNAND under one Title ID high half, listed by their low
/// halves.
#[derive(Debug)]
pub struct InstalledTitles {
    pub title_type: String,
    pub titles: Vec<String>,
}

fn safe_create_dir(dir: &Path) -> Result<(), EmuNandError> {
    if !dir.exists() {
        fs::create_dir(dir)?;
    } else if !dir.is_dir() {
        return Err(EmuNandError::DirectoryNameConflict(dir.display().to_string()));
    }
    Ok(())
}

fn tid_halves(title_id: u64) -> (String, String) {
    (format!("{:08x}", title_id >> 32), format!("{:08x}", title_id as u32))
}

/// An EmuNAND rooted at a directory on the host filesystem. Opening one initializes the basic
/// NAND directory structure if it doesn't already exist.
#[derive(Debug)]
pub struct EmuNand {
    root: PathBuf,
}

impl EmuNand {
    /// Opens an existing EmuNAND root, creating the standard directory skeleton as needed.
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<EmuNand, EmuNandError> {
        let root = root.into();
        if !root.exists() {
            return Err(EmuNandError::RootNotFound);
        }
        let emunand = EmuNand { root };
        for dir in EMUNAND_DIRS {
            safe_create_dir(&emunand.dir(dir))?;
        }
        Ok(emunand)
    }

    /// Gets the path of a directory in the root of the EmuNAND.
    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Scans the titles installed to the EmuNAND, grouped by Title ID high half. A title counts
    /// as installed when its title.tmd is present.
    pub fn installed_titles(&self) -> Vec<InstalledTitles> {
        let mut installed = Vec::new();
        let highs: Vec<PathBuf> = glob(&format!("{}/*", self.dir("title").display()))
            .unwrap().filter_map(|f| f.ok()).collect();
        for high in highs {
            if !high.is_dir() {
                continue;
            }
            let mut valid_lows = Vec::new();
            let lows: Vec<PathBuf> = glob(&format!("{}/*", high.display()))
                .unwrap().filter_map(|f| f.ok()).collect();
            for low in lows {
                if low.join("content").join("title.tmd").exists() {
                    valid_lows.push(low.file_name().unwrap().to_string_lossy().to_uppercase());
                }
            }
            installed.push(InstalledTitles {
                title_type: high.file_name().unwrap().to_string_lossy().to_uppercase(),
                titles: valid_lows,
            });
        }
        installed
    }

    /// Gets the Ticket for a title installed to the EmuNAND, if one is present.
    pub fn title_ticket(&self, title_id: u64) -> Option<ticket::Ticket> {
        let (high, low) = tid_halves(title_id);
        let ticket_path = self.dir("ticket").join(high).join(format!("{}.tik", low));
        let data = fs::read(ticket_path).ok()?;
        ticket::Ticket::from_bytes(&data).ok()
    }

    /// Gets the TMD for a title installed to the EmuNAND, if one is present.
    pub fn title_tmd(&self, title_id: u64) -> Option<tmd::Tmd> {
        let (high, low) = tid_halves(title_id);
        let tmd_path = self.dir("title").join(high).join(low).join("content").join("title.tmd");
        let data = fs::read(tmd_path).ok()?;
        tmd::Tmd::from_bytes(&data).ok()
    }

    /// Installs the provided title to the EmuNAND, mimicking a WAD installation performed by
    /// ES: the Ticket goes to /ticket/, the TMD and decrypted normal contents to /title/,
    /// shared contents to /shared1/ via content.map, the footer to /meta/, and the Title ID is
    /// registered in uid.sys. The "override meta" option installs the content at index 0 as
    /// title.met in place of any actual footer data.
    pub fn install_title(&self, title: &Title, override_meta: bool) -> Result<(), EmuNandError> {
        let (tid_high, tid_low) = tid_halves(title.tmd.title_id());
        // Tickets are installed to /ticket/<tid_high>/<tid_low>.tik.
        let ticket_dir = self.dir("ticket").join(&tid_high);
        safe_create_dir(&ticket_dir)?;
        fs::write(ticket_dir.join(format!("{}.tik", tid_low)), title.ticket.to_bytes()?)?;
        // TMDs and non-shared content are installed to /title/<tid_high>/<tid_low>/content/,
        // as title.tmd and <cid>.app.
        let mut title_dir = self.dir("title").join(&tid_high);
        safe_create_dir(&title_dir)?;
        title_dir = title_dir.join(&tid_low);
        safe_create_dir(&title_dir)?;
        safe_create_dir(&title_dir.join("data"))?;
        title_dir = title_dir.join("content");
        if title_dir.exists() {
            fs::remove_dir_all(&title_dir)?;
        }
        fs::create_dir(&title_dir)?;
        fs::write(title_dir.join("title.tmd"), title.tmd.to_bytes()?)?;
        for record in title.tmd.content_records() {
            if record.kind == tmd::ContentKind::Normal {
                let content_path = title_dir.join(format!("{:08x}.app", record.content_id));
                fs::write(content_path, title.get_content_by_index(record.index)?)?;
            }
        }
        // Shared content goes to /shared1/, with incremental names assigned by the records in
        // /shared1/content.map.
        let content_map_path = self.dir("shared1").join("content.map");
        let mut content_map = if content_map_path.exists() {
            content::SharedContentMap::from_bytes(&fs::read(&content_map_path)?)?
        } else {
            content::SharedContentMap::new()
        };
        for record in title.tmd.content_records() {
            if record.kind == tmd::ContentKind::Shared {
                if let Some(name) = content_map.add(record.hash) {
                    let content_path = self.dir("shared1").join(format!("{}.app", name));
                    fs::write(content_path, title.get_content_by_index(record.index)?)?;
                }
            }
        }
        fs::write(&content_map_path, content_map.to_bytes()?)?;
        // The footer (officially "meta") is installed to /meta/<tid_high>/<tid_low>/title.met.
        let meta_data = if override_meta {
            title.get_content_by_index(title.tmd.content_records()[0].index)?
        } else {
            title.meta().to_vec()
        };
        if !meta_data.is_empty() {
            let mut meta_dir = self.dir("meta").join(&tid_high);
            safe_create_dir(&meta_dir)?;
            meta_dir = meta_dir.join(&tid_low);
            safe_create_dir(&meta_dir)?;
            fs::write(meta_dir.join("title.met"), meta_data)?;
        }
        // Register the title in uid.sys (creating the file if needed) so that it actually
        // shows up, at least for channels.
        let uid_sys_path = self.dir("sys").join("uid.sys");
        let mut uid_sys = if uid_sys_path.exists() {
            uid::UidSys::from_bytes(&fs::read(&uid_sys_path)?)?
        } else {
            uid::UidSys::new()
        };
        let _ = uid_sys.add(title.tmd.title_id());
        fs::write(&uid_sys_path, uid_sys.to_bytes()?)?;
        Ok(())
    }

    /// Uninstalls the title with the provided Title ID from the EmuNAND: the Ticket, contents,
    /// and meta entry are removed, while shared contents and any save data the title has
    /// written under its `data` directory are left in place.
    pub fn uninstall_title(&self, title_id: u64) -> Result<(), EmuNandError> {
        let (tid_high, tid_low) = tid_halves(title_id);
        let title_dir = self.dir("title").join(&tid_high).join(&tid_low);
        if !title_dir.exists() {
            return Err(EmuNandError::TitleNotInstalled);
        }
        let ticket_path = self.dir("ticket").join(&tid_high).join(format!("{}.tik", tid_low));
        if ticket_path.exists() {
            fs::remove_file(&ticket_path)?;
        }
        // Only delete the title directory wholesale when no save data exists; otherwise just
        // the content directory goes, so the save data survives a reinstall.
        let data_dir = title_dir.join("data");
        let has_save_data = data_dir.exists() && fs::read_dir(&data_dir)?.next().is_some();
        if has_save_data {
            fs::remove_dir_all(title_dir.join("content"))?;
        } else {
            fs::remove_dir_all(&title_dir)?;
        }
        let meta_dir = self.dir("meta").join(&tid_high).join(&tid_low);
        if meta_dir.exists() {
            fs::remove_dir_all(&meta_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_initializes_skeleton() {
        let root = std::env::temp_dir().join(format!("wiikit-emunand-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let emunand = EmuNand::open(&*root).unwrap();
        for dir in EMUNAND_DIRS {
            assert!(emunand.dir(dir).is_dir());
        }
        assert!(emunand.installed_titles().is_empty());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_open_missing_root() {
        assert!(matches!(
            EmuNand::open(Path::new("/nonexistent/wiikit-emunand")),
            Err(EmuNandError::RootNotFound)
        ));
    }

    #[test]
    fn test_tid_halves() {
        let (high, low) = tid_halves(0x0001000848414241);
        assert_eq!(high, "00010008");
        assert_eq!(low, "48414241");
    }

    // Lays out the on-disk remains of an installed title so uninstall paths can be exercised
    // without building a full Title.
    fn fake_install(emunand: &EmuNand, title_id: u64, save_data: Option<&[u8]>) {
        let (high, low) = tid_halves(title_id);
        let title_dir = emunand.dir("title").join(&high).join(&low);
        fs::create_dir_all(title_dir.join("content")).unwrap();
        fs::write(title_dir.join("content").join("title.tmd"), b"tmd").unwrap();
        fs::create_dir_all(title_dir.join("data")).unwrap();
        if let Some(data) = save_data {
            fs::write(title_dir.join("data").join("save.bin"), data).unwrap();
        }
        let ticket_dir = emunand.dir("ticket").join(&high);
        fs::create_dir_all(&ticket_dir).unwrap();
        fs::write(ticket_dir.join(format!("{}.tik", low)), b"tik").unwrap();
    }

    #[test]
    fn test_uninstall_preserves_save_data() {
        let root = std::env::temp_dir().join(format!("wiikit-emunand-uninstall-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let emunand = EmuNand::open(&*root).unwrap();
        let title_id = 0x0001000848414241;
        fake_install(&emunand, title_id, Some(b"progress"));
        emunand.uninstall_title(title_id).unwrap();
        let (high, low) = tid_halves(title_id);
        let title_dir = emunand.dir("title").join(&high).join(&low);
        // The contents and ticket must be gone, but the save data must survive.
        assert!(!title_dir.join("content").exists());
        assert!(!emunand.dir("ticket").join(&high).join(format!("{}.tik", low)).exists());
        assert_eq!(fs::read(title_dir.join("data").join("save.bin")).unwrap(), b"progress");
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_uninstall_removes_title_without_save_data() {
        let root = std::env::temp_dir().join(format!("wiikit-emunand-uninstall-empty-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let emunand = EmuNand::open(&*root).unwrap();
        let title_id = 0x0001000848414242;
        fake_install(&emunand, title_id, None);
        emunand.uninstall_title(title_id).unwrap();
        let (high, low) = tid_halves(title_id);
        // An empty data directory doesn't count as save data, so the whole title goes.
        assert!(!emunand.dir("title").join(&high).join(&low).exists());
        assert!(matches!(emunand.uninstall_title(title_id), Err(EmuNandError::TitleNotInstalled)));
        fs::remove_dir_all(&root).unwrap();
    }
}
