//! 索引文件格式（小端）：
//!
//! ```text
//! "TMIX" | bincode(IndexHeader) | count * dimension 个 f32 | bincode(Vec<String>)
//! ```
//!
//! 校验和只覆盖向量数据部分。

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use bincode::Options;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::flat::checksum_of;
use super::{FlatIndex, IndexMetadata};
use crate::error::{EngineError, Result};

pub const MAGIC: &[u8; 4] = b"TMIX";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    version: u32,
    dimension: u64,
    count: u64,
    build_timestamp: u64,
    checksum: [u8; 32],
}

fn corrupted(msg: impl Into<String>) -> EngineError {
    EngineError::IndexCorruption(msg.into())
}

/// 写入索引文件
///
/// 先写入临时文件再重命名，避免写入中途失败导致旧文件损坏
pub fn write_index(index: &FlatIndex, path: impl AsRef<Path>) -> Result<IndexMetadata> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_file = path.to_path_buf();
    tmp_file.set_extension("tmp");

    let header = IndexHeader {
        version: FORMAT_VERSION,
        dimension: index.dimension() as u64,
        count: index.len() as u64,
        build_timestamp: index.built_at(),
        checksum: *index.checksum().as_bytes(),
    };

    let mut writer = BufWriter::new(File::create(&tmp_file)?);
    writer.write_all(MAGIC)?;
    bincode::serialize_into(&mut writer, &header)
        .map_err(|e| EngineError::Storage(format!("写入索引头失败: {e}")))?;
    for &x in index.vectors() {
        writer.write_f32::<LittleEndian>(x)?;
    }
    bincode::serialize_into(&mut writer, index.ids())
        .map_err(|e| EngineError::Storage(format!("写入记录 ID 失败: {e}")))?;

    let file = writer.into_inner().map_err(|e| EngineError::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_file, path)?;

    Ok(index.metadata())
}

/// 读取索引文件，任何结构错误或校验和不匹配都会返回 `IndexCorruption`
pub fn read_index(path: impl AsRef<Path>) -> Result<FlatIndex> {
    let data = fs::read(path.as_ref())?;
    let total = data.len() as u64;
    let mut cursor = Cursor::new(data.as_slice());

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(|_| corrupted("文件过短"))?;
    if &magic != MAGIC {
        return Err(corrupted("文件标识不匹配"));
    }

    let header: IndexHeader =
        bincode::deserialize_from(&mut cursor).map_err(|e| corrupted(format!("索引头: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err(corrupted(format!("不支持的格式版本: {}", header.version)));
    }
    if header.dimension == 0 {
        return Err(corrupted("向量维数为 0"));
    }

    let len = header
        .count
        .checked_mul(header.dimension)
        .filter(|n| n.checked_mul(4).is_some_and(|b| b <= total - cursor.position()))
        .ok_or_else(|| corrupted("向量数量与文件长度不匹配"))? as usize;

    let mut vectors = vec![0f32; len];
    cursor
        .read_f32_into::<LittleEndian>(&mut vectors)
        .map_err(|_| corrupted("向量数据不完整"))?;

    let checksum = checksum_of(&vectors);
    if checksum.as_bytes() != &header.checksum {
        return Err(corrupted(format!(
            "校验和不匹配: 期望 {}，实际 {}",
            blake3::Hash::from(header.checksum).to_hex(),
            checksum.to_hex()
        )));
    }

    // ID 部分不在校验和范围内，长度前缀可能已损坏，解码时不得超出文件剩余部分
    let rest = &data[cursor.position() as usize..];
    let ids: Vec<String> = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(rest.len() as u64)
        .reject_trailing_bytes()
        .deserialize(rest)
        .map_err(|e| corrupted(format!("记录 ID: {e}")))?;
    if ids.len() as u64 != header.count {
        return Err(corrupted(format!("记录 ID 数量 {} 与向量数量 {} 不一致", ids.len(), header.count)));
    }

    FlatIndex::from_parts(header.dimension as usize, ids, vectors, header.build_timestamp)
}
