//! 文件内容指纹

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 计算文件内容的 CRC32，输出 8 位小写十六进制
///
/// 远程文件树中的 hash 由服务端以同样的方式计算，两边相等即视为内容未变化。
pub fn calculate_hash(data: &[u8]) -> String {
    format!("{:08x}", CRC32.checksum(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_checksums() {
        assert_eq!(calculate_hash(b"123456789"), "cbf43926");
        assert_eq!(calculate_hash(b""), "00000000");
    }

    #[test]
    fn test_hash_is_zero_padded() {
        let hash = calculate_hash(b"a");
        assert_eq!(hash, "e8b7be43");
        assert_eq!(calculate_hash(b"var a = 1;").len(), 8);
    }

    #[test]
    fn test_hash_detects_change() {
        assert_ne!(calculate_hash(b"var a = 1;"), calculate_hash(b"var a = 2;"));
        assert_ne!(calculate_hash(b""), calculate_hash(b" "));
    }
}
