//! 大端字段读取器
//!
//! 基于 `bytes::Buf` 逐字段读取，每次读取前检查剩余长度，
//! 因此任何截断输入都会得到 `ProtocolError::Truncated` 而不是 panic。

use crate::ProtocolError;
use bytes::Buf;

/// 对只读字节切片的顺序读取器
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// 剩余未读字节数
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// 剩余字节切片（不消耗）
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }

    /// 跳过 `n` 个 f64 字段
    pub fn skip_f64(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.skip(n * 8)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn i8(&mut self) -> Result<i8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.u8()? != 0)
    }

    pub fn i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn f64(&mut self) -> Result<f64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// 读取 `N` 个连续 f64
    pub fn f64_array<const N: usize>(&mut self) -> Result<[f64; N], ProtocolError> {
        self.ensure(N * 8)?;
        let mut out = [0.0; N];
        for value in out.iter_mut() {
            *value = self.buf.get_f64();
        }
        Ok(out)
    }

    /// 读取定长字节并按 UTF-8 宽松解码
    pub fn string(&mut self, len: usize) -> Result<String, ProtocolError> {
        self.ensure(len)?;
        let text = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102u16.to_be_bytes());
        data.extend_from_slice(&(-2i32).to_be_bytes());
        data.extend_from_slice(&1.5f64.to_be_bytes());
        let mut reader = FrameReader::new(&data);
        assert_eq!(reader.i16().unwrap(), 0x0102);
        assert_eq!(reader.i32().unwrap(), -2);
        assert_eq!(reader.f64().unwrap(), 1.5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_is_error_not_panic() {
        let data = [0u8; 5];
        let mut reader = FrameReader::new(&data);
        assert_eq!(
            reader.f64(),
            Err(ProtocolError::Truncated {
                needed: 8,
                remaining: 5
            })
        );
        // 失败的读取不消耗数据
        assert_eq!(reader.remaining(), 5);
    }

    #[test]
    fn test_f64_array() {
        let mut data = Vec::new();
        for v in [1.0f64, 2.0, 3.0] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        let mut reader = FrameReader::new(&data);
        assert_eq!(reader.f64_array::<3>().unwrap(), [1.0, 2.0, 3.0]);
    }
}
