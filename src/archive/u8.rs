// archive/u8.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and packing of U8 archives.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

const U8_MAGIC: [u8; 4] = [0x55, 0xAA, 0x38, 0x2D];
const IMET_MAGIC: [u8; 4] = [0x49, 0x4D, 0x45, 0x54];

#[derive(Debug, Error)]
pub enum U8Error {
    #[error("this does not appear to be a U8 archive (missing magic number)")]
    NotU8Data,
    #[error("found invalid node type {0} while processing node at index {1}")]
    InvalidNodeType(u8, usize),
    #[error("invalid file name at offset {0:#X}")]
    InvalidFileName(u64),
    #[error("U8 data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// A directory inside a U8 archive, holding its child directories and files. The archive root
/// is itself a U8Directory with an empty name.
#[derive(Debug, Clone, Default)]
pub struct U8Directory {
    pub name: String,
    pub dirs: Vec<U8Directory>,
    pub files: Vec<U8File>,
}

/// A file inside a U8 archive.
#[derive(Debug, Clone)]
pub struct U8File {
    pub name: String,
    pub data: Vec<u8>,
}

// The on-disk node table entry: a type byte, a u24 offset into the string table, and the data
// offset and size (for directories, the parent index and the index one past their last child).
#[derive(Debug, Clone, Copy)]
struct U8Node {
    node_type: u8,
    name_offset: u32,
    data_offset: u32,
    size: u32,
}

impl U8Directory {
    /// Creates a new, empty directory with the given name.
    pub fn new(name: &str) -> Self {
        U8Directory {
            name: name.to_string(),
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Adds a child directory and returns a reference to it.
    pub fn add_dir(&mut self, dir: U8Directory) -> &mut U8Directory {
        self.dirs.push(dir);
        self.dirs.last_mut().unwrap()
    }

    /// Adds a file to the directory.
    pub fn add_file(&mut self, file: U8File) {
        self.files.push(file);
    }

    /// Gets the file with the given name, if the directory contains one.
    pub fn file(&self, name: &str) -> Option<&U8File> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Counts the nodes this directory tree occupies in an archive, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.files.len() + self.dirs.iter().map(|dir| dir.node_count()).sum::<usize>()
    }

    /// Creates a new U8Directory tree from the binary data of a U8 archive. Channel banners
    /// with an IMET header ahead of the archive are handled as well.
    pub fn from_bytes(data: &[u8]) -> Result<U8Directory, U8Error> {
        let mut buf = Cursor::new(data);
        find_archive_start(&mut buf)?;
        // Skip root_node_offset, header_size, data_offset, and 16 bytes of padding; the node
        // table itself pins down everything we need.
        buf.seek(SeekFrom::Current(28))?;
        // The root node's size field is the total node count.
        let root = read_node(&mut buf)?;
        let mut nodes = vec![root];
        for _ in 1..root.size {
            nodes.push(read_node(&mut buf)?);
        }
        let string_table_offset = buf.position();
        let mut reader = U8TreeReader {
            buf,
            nodes,
            string_table_offset,
        };
        let mut root_dir = U8Directory::new("");
        reader.read_children(0, &mut root_dir)?;
        Ok(root_dir)
    }

    /// Dumps the data in a U8Directory tree back into the binary data of a U8 archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>, U8Error> {
        // Flatten the tree back into node order: every directory is followed by its files and
        // then its child directories.
        let mut names: Vec<String> = vec![String::new()];
        let mut file_data: Vec<Vec<u8>> = vec![Vec::new()];
        let mut nodes: Vec<U8Node> = vec![U8Node {
            node_type: 1,
            name_offset: 0,
            data_offset: 0,
            size: self.node_count() as u32,
        }];
        flatten_dir(self, &mut names, &mut file_data, &mut nodes);
        // The "header" for sizing purposes is the node table plus the string table.
        let mut header_size: u32 = (nodes.len() * 12) as u32;
        for name in &names {
            header_size += name.len() as u32 + 1;
        }
        let data_offset = (header_size + 32 + 63) & !63;
        // Lay out names and file data, aligning each file to 32 bytes.
        let mut current_name_offset = 0;
        let mut current_data_offset = data_offset;
        for (i, node) in nodes.iter_mut().enumerate() {
            node.name_offset = current_name_offset;
            current_name_offset += names[i].len() as u32 + 1;
            if node.node_type == 0 {
                node.data_offset = (current_data_offset + 31) & !31;
                current_data_offset += (node.size + 31) & !31;
            }
        }
        let mut buf: Vec<u8> = Vec::new();
        buf.extend(U8_MAGIC);
        buf.write_u32::<BigEndian>(0x20)?; // The root node offset is always 0x20.
        buf.write_u32::<BigEndian>(header_size)?;
        buf.write_u32::<BigEndian>(data_offset)?;
        buf.extend([0u8; 16]);
        for node in &nodes {
            buf.write_u8(node.node_type)?;
            buf.write_u24::<BigEndian>(node.name_offset)?;
            buf.write_u32::<BigEndian>(node.data_offset)?;
            buf.write_u32::<BigEndian>(node.size)?;
        }
        for name in &names {
            buf.extend(name.as_bytes());
            buf.push(0);
        }
        buf.resize((buf.len() + 63) & !63, 0);
        for data in &file_data {
            if !data.is_empty() {
                buf.resize((buf.len() + 31) & !31, 0);
                buf.extend(data);
            }
        }
        Ok(buf)
    }
}

impl U8File {
    /// Creates a new file with the given name and contents.
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        U8File {
            name: name.to_string(),
            data,
        }
    }
}

// Seeks the reader to the U8 magic, skipping over the IMET header variants used by channel
// banners (IMET at 0x40 puts the archive at 0x600, IMET at 0x80 puts it at 0x640).
fn find_archive_start(buf: &mut Cursor<&[u8]>) -> Result<(), U8Error> {
    let mut magic = [0u8; 4];
    buf.read_exact(&mut magic)?;
    if magic == U8_MAGIC {
        return Ok(());
    }
    for (imet_offset, archive_offset) in [(0x40, 0x600), (0x80, 0x640)] {
        buf.seek(SeekFrom::Start(imet_offset))?;
        if buf.read_exact(&mut magic).is_ok() && magic == IMET_MAGIC {
            buf.seek(SeekFrom::Start(archive_offset))?;
            buf.read_exact(&mut magic)?;
            if magic == U8_MAGIC {
                return Ok(());
            }
            return Err(U8Error::NotU8Data);
        }
    }
    Err(U8Error::NotU8Data)
}

fn read_node(buf: &mut Cursor<&[u8]>) -> Result<U8Node, U8Error> {
    Ok(U8Node {
        node_type: buf.read_u8()?,
        name_offset: buf.read_u24::<BigEndian>()?,
        data_offset: buf.read_u32::<BigEndian>()?,
        size: buf.read_u32::<BigEndian>()?,
    })
}

struct U8TreeReader<'a> {
    buf: Cursor<&'a [u8]>,
    nodes: Vec<U8Node>,
    string_table_offset: u64,
}

impl U8TreeReader<'_> {
    fn read_name(&mut self, name_offset: u32) -> Result<String, U8Error> {
        let offset = self.string_table_offset + name_offset as u64;
        self.buf.seek(SeekFrom::Start(offset))?;
        let mut name = Vec::new();
        loop {
            match self.buf.read_u8()? {
                0 => break,
                byte => name.push(byte),
            }
        }
        String::from_utf8(name).map_err(|_| U8Error::InvalidFileName(offset))
    }

    // Reads the children of the directory node at `index` into `dir`, recursing into child
    // directories, and returns the index one past the directory's last child.
    fn read_children(&mut self, index: usize, dir: &mut U8Directory) -> Result<usize, U8Error> {
        let end = self.nodes[index].size as usize;
        let mut child = index + 1;
        while child < end {
            let node = self.nodes[child];
            match node.node_type {
                0 => {
                    let name = self.read_name(node.name_offset)?;
                    self.buf.seek(SeekFrom::Start(node.data_offset as u64))?;
                    let mut data = vec![0u8; node.size as usize];
                    self.buf.read_exact(&mut data)?;
                    dir.files.push(U8File { name, data });
                    child += 1;
                },
                1 => {
                    let mut child_dir = U8Directory::new(&self.read_name(node.name_offset)?);
                    child = self.read_children(child, &mut child_dir)?;
                    dir.dirs.push(child_dir);
                },
                other => return Err(U8Error::InvalidNodeType(other, child)),
            }
        }
        Ok(end)
    }
}

fn flatten_dir(dir: &U8Directory, names: &mut Vec<String>, file_data: &mut Vec<Vec<u8>>, nodes: &mut Vec<U8Node>) {
    let parent_index = nodes.len() - 1;
    for file in &dir.files {
        names.push(file.name.clone());
        file_data.push(file.data.clone());
        nodes.push(U8Node {
            node_type: 0,
            name_offset: 0,
            data_offset: 0,
            size: file.data.len() as u32,
        });
    }
    for child in &dir.dirs {
        names.push(child.name.clone());
        file_data.push(Vec::new());
        nodes.push(U8Node {
            node_type: 1,
            name_offset: 0,
            data_offset: parent_index as u32,
            size: (nodes.len() + child.node_count()) as u32,
        });
        flatten_dir(child, names, file_data, nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> U8Directory {
        let mut root = U8Directory::new("");
        root.add_file(U8File::new("banner.bin", vec![0x10; 100]));
        let meta = root.add_dir(U8Directory::new("meta"));
        meta.add_file(U8File::new("icon.bin", vec![0x20; 37]));
        meta.add_file(U8File::new("sound.bin", vec![0x30; 5]));
        root.add_dir(U8Directory::new("empty"));
        root
    }

    #[test]
    fn test_round_trip() {
        let root = sample_archive();
        let data = root.to_bytes().unwrap();
        assert_eq!(data[0..4], U8_MAGIC);
        let reparsed = U8Directory::from_bytes(&data).unwrap();
        assert_eq!(reparsed.files.len(), 1);
        assert_eq!(reparsed.dirs.len(), 2);
        assert_eq!(reparsed.file("banner.bin").unwrap().data, vec![0x10; 100]);
        let meta = &reparsed.dirs[0];
        assert_eq!(meta.name, "meta");
        assert_eq!(meta.file("icon.bin").unwrap().data, vec![0x20; 37]);
        assert_eq!(meta.file("sound.bin").unwrap().data, vec![0x30; 5]);
        assert_eq!(reparsed.dirs[1].name, "empty");
        // Packing the reparsed tree must reproduce the same bytes.
        assert_eq!(reparsed.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_node_count() {
        assert_eq!(sample_archive().node_count(), 6);
    }

    #[test]
    fn test_not_u8_data() {
        assert!(matches!(U8Directory::from_bytes(&[0u8; 256]), Err(U8Error::NotU8Data)));
    }
}
