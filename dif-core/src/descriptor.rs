//! Descriptor and envelope model, and its mapping to bencode.
//!
//! Only [`ContentDescriptor`] (the `info` dictionary) feeds the fingerprint;
//! everything else in the [`Envelope`] is passed through untouched.

use crate::bencode::{self, DictBuilder, Value};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, PieceDigest, DIGEST_LEN};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension used for persisted envelopes.
pub const DESCRIPTOR_EXTENSION: &str = "torrent";

/// Largest piece length accepted when building or decoding (1 GiB).
pub const MAX_PIECE_LENGTH: u64 = 1 << 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub length: u64,
    /// Informational only. For multi-file layouts this is the path-hash
    /// ordering key rather than a content checksum.
    pub md5sum: Option<String>,
}

impl FileEntry {
    pub fn rel_path(&self) -> PathBuf {
        self.path.iter().collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Layout {
    Single { length: u64, md5sum: Option<String> },
    Multi { files: Vec<FileEntry> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub name: String,
    pub piece_length: u64,
    pub layout: Layout,
    pub pieces: Vec<PieceDigest>,
}

impl ContentDescriptor {
    pub fn total_length(&self) -> u64 {
        match &self.layout {
            Layout::Single { length, .. } => *length,
            Layout::Multi { files } => files.iter().map(|f| f.length).sum(),
        }
    }

    /// Paths of the described files relative to the directory holding `name`.
    pub fn relative_files(&self) -> Vec<PathBuf> {
        match &self.layout {
            Layout::Single { .. } => vec![PathBuf::from(&self.name)],
            Layout::Multi { files } => {
                files.iter().map(|f| Path::new(&self.name).join(f.rel_path())).collect()
            }
        }
    }

    pub fn to_value(&self) -> Value {
        let mut blob = Vec::with_capacity(self.pieces.len() * DIGEST_LEN);
        for p in &self.pieces {
            blob.extend_from_slice(p);
        }
        let d = DictBuilder::new()
            .insert("name", self.name.as_str())
            .insert("piece length", int(self.piece_length))
            .insert("pieces", blob);
        match &self.layout {
            Layout::Single { length, md5sum } => {
                d.insert("length", int(*length)).insert_opt("md5sum", md5sum.clone()).build()
            }
            Layout::Multi { files } => {
                let files = files
                    .iter()
                    .map(|f| {
                        DictBuilder::new()
                            .insert(
                                "path",
                                f.path.iter().map(|s| Value::from(s.as_str())).collect::<Vec<_>>(),
                            )
                            .insert("length", int(f.length))
                            .insert_opt("md5sum", f.md5sum.clone())
                            .build()
                    })
                    .collect::<Vec<_>>();
                d.insert("files", files).build()
            }
        }
    }

    pub fn from_value(v: &Value) -> Result<Self> {
        if v.as_dict().is_none() {
            return Err(malformed("info is not a dictionary"));
        }
        let name = req_str(v, "name")?;
        let piece_length = req_uint(v, "piece length")?;
        if piece_length == 0 {
            return Err(malformed("piece length is zero"));
        }
        if piece_length > MAX_PIECE_LENGTH {
            return Err(malformed(format!("piece length {piece_length} exceeds {MAX_PIECE_LENGTH}")));
        }
        let blob = v.get("pieces").and_then(Value::as_bytes).ok_or_else(|| malformed("missing pieces"))?;
        if blob.len() % DIGEST_LEN != 0 {
            return Err(malformed(format!(
                "pieces blob of {} bytes is not a multiple of {DIGEST_LEN}",
                blob.len()
            )));
        }
        let pieces = blob
            .chunks_exact(DIGEST_LEN)
            .map(|c| {
                let mut d = [0u8; DIGEST_LEN];
                d.copy_from_slice(c);
                d
            })
            .collect();

        let layout = match (v.get("files"), v.get("length")) {
            (Some(files), None) => {
                let list = files.as_list().ok_or_else(|| malformed("files is not a list"))?;
                let files = list.iter().map(file_entry_from_value).collect::<Result<Vec<_>>>()?;
                Layout::Multi { files }
            }
            (None, Some(_)) => Layout::Single {
                length: req_uint(v, "length")?,
                md5sum: opt_str(v, "md5sum")?,
            },
            (Some(_), Some(_)) => return Err(malformed("both files and length present")),
            (None, None) => return Err(malformed("neither files nor length present")),
        };
        Ok(Self { name, piece_length, layout, pieces })
    }

    /// Canonical bytes the fingerprint is computed over.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.canonical_bytes())
    }
}

fn file_entry_from_value(v: &Value) -> Result<FileEntry> {
    let segs = v
        .get("path")
        .and_then(Value::as_list)
        .ok_or_else(|| malformed("file entry without path list"))?;
    let path = segs
        .iter()
        .map(|s| s.as_str().map(str::to_string).ok_or_else(|| malformed("path segment is not text")))
        .collect::<Result<Vec<_>>>()?;
    if path.is_empty() {
        return Err(malformed("file entry with empty path"));
    }
    Ok(FileEntry { path, length: req_uint(v, "length")?, md5sum: opt_str(v, "md5sum")? })
}

/// The persisted object: descriptor plus pass-through metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub announce: String,
    pub announce_list: Option<Vec<Vec<String>>>,
    /// Unix seconds; never part of the fingerprint.
    pub creation_date: i64,
    pub comment: Option<String>,
    pub http_seeds: Option<Vec<String>>,
    pub info: ContentDescriptor,
}

impl Envelope {
    pub fn fingerprint(&self) -> Fingerprint {
        self.info.fingerprint()
    }

    pub fn to_value(&self) -> Value {
        DictBuilder::new()
            .insert("announce", self.announce.as_str())
            .insert("creation date", self.creation_date)
            .insert("info", self.info.to_value())
            .insert_opt("comment", self.comment.clone())
            .insert_opt("httpseeds", self.http_seeds.as_ref().map(|s| str_list(s)))
            .insert_opt(
                "announce-list",
                self.announce_list
                    .as_ref()
                    .map(|tiers| tiers.iter().map(|t| Value::List(str_list(t))).collect::<Vec<_>>()),
            )
            .build()
    }

    pub fn from_value(v: &Value) -> Result<Self> {
        if v.as_dict().is_none() {
            return Err(malformed("envelope is not a dictionary"));
        }
        let info = ContentDescriptor::from_value(v.get("info").ok_or_else(|| malformed("missing info"))?)?;
        let announce = opt_str(v, "announce")?.unwrap_or_default();
        let creation_date = match v.get("creation date") {
            None => 0,
            Some(d) => d.as_int().ok_or_else(|| malformed("creation date is not an integer"))?,
        };
        let comment = opt_str(v, "comment")?;
        let http_seeds = match v.get("httpseeds") {
            None => None,
            Some(list) => Some(text_list(list, "httpseeds must be a list")?),
        };
        let announce_list = match v.get("announce-list") {
            None => None,
            Some(tiers) => {
                let tiers = tiers
                    .as_list()
                    .ok_or_else(|| Error::invalid("announce-list must be a list of lists"))?;
                Some(
                    tiers
                        .iter()
                        .map(|t| text_list(t, "announce-list must be a list of lists"))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        };
        Ok(Self { announce, announce_list, creation_date, comment, http_seeds, info })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(&bencode::decode(data)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::from_bytes(&data)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()).map_err(|e| Error::io(path, e))
    }

    /// `<name>.torrent`, relative to the current directory.
    pub fn default_file_name(&self) -> PathBuf {
        PathBuf::from(format!("{}.{DESCRIPTOR_EXTENSION}", self.info.name))
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedDescriptor(msg.into())
}

fn int(n: u64) -> Value {
    // lengths above i64::MAX cannot exist on any real filesystem
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn str_list(items: &[String]) -> Vec<Value> {
    items.iter().map(|s| Value::from(s.as_str())).collect()
}

fn text_list(v: &Value, err: &str) -> Result<Vec<String>> {
    let list = v.as_list().ok_or_else(|| Error::invalid(err))?;
    list.iter()
        .map(|s| s.as_str().map(str::to_string).ok_or_else(|| Error::invalid(err)))
        .collect()
}

fn req_str(v: &Value, key: &str) -> Result<String> {
    opt_str(v, key)?.ok_or_else(|| malformed(format!("missing {key}")))
}

fn opt_str(v: &Value, key: &str) -> Result<Option<String>> {
    match v.get(key) {
        None => Ok(None),
        Some(s) => s
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| malformed(format!("{key} is not UTF-8 text"))),
    }
}

fn req_uint(v: &Value, key: &str) -> Result<u64> {
    let i = v.get(key).and_then(Value::as_int).ok_or_else(|| malformed(format!("missing integer {key}")))?;
    u64::try_from(i).map_err(|_| malformed(format!("{key} is negative")))
}
