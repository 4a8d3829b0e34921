//! 设备号编码
//!
//! 采用 Linux glibc 的 64 位编码方式，主设备号与次设备号各占 32 位。

/// 设备号
pub type DeviceId = u64;

/// 由主、次设备号构造设备号
pub const fn makedev(major: u32, minor: u32) -> DeviceId {
    let major = major as u64;
    let minor = minor as u64;
    ((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)
}

/// 取主设备号
pub const fn major(dev: DeviceId) -> u32 {
    (((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff)) as u32
}

/// 取次设备号
pub const fn minor(dev: DeviceId) -> u32 {
    (((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_minor() {
        let dev = makedev(4, 64);
        assert_eq!(major(dev), 4);
        assert_eq!(minor(dev), 64);

        let big = makedev(0x1234, 0x12_3456);
        assert_eq!(major(big), 0x1234);
        assert_eq!(minor(big), 0x12_3456);
    }
}
