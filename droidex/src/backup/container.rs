use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};
use tempfile::NamedTempFile;

use super::Error;
use crate::utils::{ensure_dir_exists, open_file};

/// `ANDROID BACKUP\n` zero padded to 24 bytes
pub const BACKUP_MAGIC: [u8; 24] = *b"ANDROID BACKUP\n\0\0\0\0\0\0\0\0\0";

/// Anything this size or smaller carries no payload at all
pub const CONTAINER_HEADER_SIZE: u64 = 24;

/// Magic, version and compression flag
pub const HEADER_LEN: usize = 32;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None = 0,
    Deflate = 1,
}

impl TryFrom<u32> for Compression {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Deflate),
            v => Err(Error::UnsupportedCompression(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupHeader {
    /// Informational only
    pub version: u32,
    pub compression: Compression,
}

impl BackupHeader {
    /// Decode the fixed 32 byte header
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < HEADER_LEN {
            return Err(Error::Truncated { len: raw.len() });
        }
        if raw[..BACKUP_MAGIC.len()] != BACKUP_MAGIC {
            return Err(Error::MagicMismatch);
        }
        let version = u32::from_le_bytes([raw[24], raw[25], raw[26], raw[27]]);
        let flag = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);
        Ok(Self {
            version,
            compression: Compression::try_from(flag)?,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..24].copy_from_slice(&BACKUP_MAGIC);
        out[24..28].copy_from_slice(&self.version.to_le_bytes());
        out[28..32].copy_from_slice(&(self.compression as u32).to_le_bytes());
        out
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut raw = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        // A short file with the wrong magic is still the wrong magic
        let magic_len = filled.min(BACKUP_MAGIC.len());
        if filled < HEADER_LEN && raw[..magic_len] != BACKUP_MAGIC[..magic_len] {
            return Err(Error::MagicMismatch);
        }
        Self::decode(&raw[..filled])
    }
}

/// A fully decoded container held in memory, `payload` is the inner archive
/// after decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupContainer {
    pub header: BackupHeader,
    pub payload: Vec<u8>,
}

impl BackupContainer {
    pub fn new(version: u32, compression: Compression, payload: Vec<u8>) -> Self {
        Self {
            header: BackupHeader {
                version,
                compression,
            },
            payload,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Self::read_from(bytes)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, Error> {
        let header = BackupHeader::read_from(&mut reader)?;
        let mut payload = Vec::new();
        decode_payload(header.compression, reader, &mut payload)?;
        Ok(Self { header, payload })
    }

    /// Serialize the container, compressing the payload if the header says so
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        match self.header.compression {
            Compression::None => out.extend_from_slice(&self.payload),
            Compression::Deflate => {
                let mut enc = ZlibEncoder::new(out, flate2::Compression::default());
                // Writing into a Vec can't fail
                enc.write_all(&self.payload)
                    .expect("in memory zlib write failed");
                out = enc.finish().expect("in memory zlib finish failed");
            }
        }
        out
    }
}

/// Copy the payload from `input` to `output`, inflating it when needed.
/// Returns the number of decoded bytes.
fn decode_payload<R: Read, W: Write>(
    compression: Compression,
    mut input: R,
    output: W,
) -> Result<u64, Error> {
    match compression {
        Compression::None => {
            let mut output = output;
            Ok(io::copy(&mut input, &mut output)?)
        }
        Compression::Deflate => inflate(input, output).map_err(Error::Decompression),
    }
}

/// Inflate a zlib stream, failing unless the stream reaches its end marker.
///
/// Truncated input has to be an error here, the buffered decoders in flate2
/// report a cut off stream as a short read.
fn inflate<R: Read, W: Write>(mut input: R, mut output: W) -> io::Result<u64> {
    let mut z = Decompress::new(true);
    let mut inbuf = vec![0u8; CHUNK_SIZE];
    let mut outbuf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = match input.read(&mut inbuf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "deflate stream ended before its end marker",
            ));
        }

        let mut chunk = &inbuf[..n];
        loop {
            let before_in = z.total_in();
            let before_out = z.total_out();
            let status = z
                .decompress(chunk, &mut outbuf, FlushDecompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (z.total_in() - before_in) as usize;
            let produced = (z.total_out() - before_out) as usize;

            output.write_all(&outbuf[..produced])?;
            written += produced as u64;
            chunk = &chunk[consumed..];

            if status == Status::StreamEnd {
                output.flush()?;
                return Ok(written);
            }
            if chunk.is_empty() && produced < outbuf.len() {
                break;
            }
            if consumed == 0 && produced == 0 {
                // Output was flushed exactly, more input is needed
                if chunk.is_empty() {
                    break;
                }
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "deflate stream made no progress",
                ));
            }
        }
    }
}

/// Make sure the decoded payload looks like a tar archive
fn validate_archive<R: Read>(reader: R, payload_len: u64) -> Result<(), Error> {
    if payload_len == 0 {
        return Err(Error::InvalidArchive(String::from("payload is empty")));
    }
    let mut archive = tar::Archive::new(reader);
    let mut entries = archive
        .entries()
        .map_err(|e| Error::InvalidArchive(e.to_string()))?;
    match entries.next() {
        Some(Err(e)) => Err(Error::InvalidArchive(e.to_string())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBackup {
    pub header: BackupHeader,
    pub archive_path: PathBuf,
    pub payload_len: u64,
}

impl ParsedBackup {
    pub fn message(&self) -> String {
        format!(
            "Backup parsed successfully (version {}, compression: {})",
            self.header.version, self.header.compression as u32
        )
    }
}

/// Decode the container at `container` and write the inner archive to
/// `archive_path`.
///
/// The payload is streamed through a temporary file next to the destination,
/// nothing is left at `archive_path` unless the whole container decoded.
pub fn parse(container: &Path, archive_path: &Path) -> Result<ParsedBackup, Error> {
    let mut reader = BufReader::new(open_file(container)?);
    let header = BackupHeader::read_from(&mut reader)?;

    let dir = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir_exists(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    let payload_len = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let n = decode_payload(header.compression, &mut reader, &mut writer)?;
        writer.flush()?;
        n
    };

    let file = tmp.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    validate_archive(BufReader::new(&mut *file), payload_len)?;

    tmp.persist(archive_path).map_err(|e| Error::from(e.error))?;

    log::debug!(
        "decoded {:?} (version {}, {:?}) into {:?}, {} bytes",
        container,
        header.version,
        header.compression,
        archive_path,
        payload_len
    );

    Ok(ParsedBackup {
        header,
        archive_path: archive_path.into(),
        payload_len,
    })
}
