use crate::error::{ProcError, Result};
use std::str::FromStr;

// 解析十进制字段，失败时返回格式错误
pub fn parse_dec<T: FromStr>(token: &str, what: &str) -> Result<T> {
    token
        .parse::<T>()
        .map_err(|_| ProcError::format(format!("invalid {}: {:?}", what, token)))
}

// 解析十六进制 u16（/proc/net/tcp 的端口列）
pub fn parse_hex_u16(token: &str, what: &str) -> Result<u16> {
    u16::from_str_radix(token, 16)
        .map_err(|_| ProcError::format(format!("invalid hex {}: {:?}", what, token)))
}

// 解析十六进制 u8（/proc/net/tcp 的状态列）
pub fn parse_hex_u8(token: &str, what: &str) -> Result<u8> {
    u8::from_str_radix(token, 16)
        .map_err(|_| ProcError::format(format!("invalid hex {}: {:?}", what, token)))
}

// /proc 下的 PID 目录名只包含数字
pub fn is_all_digits(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}
