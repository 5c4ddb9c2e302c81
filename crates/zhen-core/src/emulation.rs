//! 防竞争字节 (emulation prevention byte) 处理.
//!
//! NAL 负载中每个 `00 00 03` 三元组的 `03` 都是编码端插入的转义字节,
//! 解析语法元素前必须去掉, 否则位级解码会错位.

/// 去除防竞争字节, 返回 RBSP 副本
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    strip_emulation_prevention(&mut out);
    out
}

/// 原地去除防竞争字节
///
/// 每遇到 `00 00 03`, 删除 `03` 并把其后的字节整体左移一位.
/// 返回删除的字节数.
pub fn strip_emulation_prevention(data: &mut Vec<u8>) -> usize {
    let mut read = 0;
    let mut write = 0;
    let mut zeros = 0;
    while read < data.len() {
        let byte = data[read];
        read += 1;
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        data[write] = byte;
        write += 1;
    }
    let removed = data.len() - write;
    data.truncate(write);
    removed
}

/// 插入防竞争字节, 把 RBSP 转为可放入 NAL 单元的负载
///
/// 每当输出将出现 `00 00 0x` (x <= 3) 时, 在 `0x` 前插入 `03`.
pub fn insert_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// 统计数据中的防竞争字节个数
pub fn count_emulation_prevention(data: &[u8]) -> usize {
    let mut zeros = 0;
    let mut count = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            count += 1;
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_emulation_prevention() {
        let data = [0x25, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x25, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(count_emulation_prevention(&data), 3);
    }

    #[test]
    fn test_insert_then_remove_restores_rbsp() {
        let rbsp = [0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03, 0x7F];
        let escaped = insert_emulation_prevention(&rbsp);
        assert_eq!(
            escaped,
            vec![0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x03, 0x7F]
        );
        assert_eq!(count_emulation_prevention(&escaped), 3);
        assert_eq!(remove_emulation_prevention(&escaped), rbsp.to_vec());
    }

    #[test]
    fn test_strip_in_place_reports_removed() {
        let mut data = vec![0x00, 0x00, 0x03, 0x03, 0xAA];
        assert_eq!(strip_emulation_prevention(&mut data), 1);
        assert_eq!(data, vec![0x00, 0x00, 0x03, 0xAA]);
    }

    #[test]
    fn test_no_escape_sequence_untouched() {
        let data = [0x00, 0x03, 0x00, 0x00, 0x04, 0x03];
        assert_eq!(remove_emulation_prevention(&data), data.to_vec());
        assert_eq!(count_emulation_prevention(&data), 0);
    }
}
