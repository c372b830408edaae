use byteorder::{ByteOrder, LittleEndian};

use crate::error::{EngineError, Result};

/// 将向量编码为小端序字节
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut buf = vec![0u8; vector.len() * 4];
    LittleEndian::write_f32_into(vector, &mut buf);
    buf
}

/// 从小端序字节解码向量
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(EngineError::Storage(format!("向量字节长度 {} 不是 4 的倍数", bytes.len())));
    }
    let mut vector = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut vector);
    Ok(vector)
}
