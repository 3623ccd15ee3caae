use std::collections::HashSet;
use std::fs;

use async_trait::async_trait;
use nix::sys::statvfs::statvfs;
use tracing::debug;

use crate::domain::{MetricKind, MetricUpdate, StorageDrive};
use crate::ports::{CollectError, Collector};

use super::parser::{self, MountInfo};
use super::ProcfsConfig;

const VIRTUAL_FILESYSTEMS: [&str; 20] = [
    "proc", "sysfs", "tmpfs", "devtmpfs", "devpts", "cgroup", "cgroup2", "securityfs", "debugfs",
    "squashfs", "autofs", "mqueue", "pstore", "bpf", "tracefs", "hugetlbfs", "fusectl",
    "configfs", "binfmt_misc", "nsfs",
];

const EXCLUDED_MOUNT_PREFIXES: [&str; 6] = ["/boot", "/snap", "/run", "/dev", "/sys", "/proc"];

/// Whether a mount is user-facing storage worth showing
pub fn is_reportable(mount: &MountInfo) -> bool {
    !VIRTUAL_FILESYSTEMS.contains(&mount.filesystem.as_str())
        && !EXCLUDED_MOUNT_PREFIXES
            .iter()
            .any(|prefix| mount.mount_point.starts_with(prefix))
        && !mount.mount_point.contains("/snap/")
}

/// Mounted filesystems from /proc/mounts, sized with statvfs
pub struct StorageCollector {
    config: ProcfsConfig,
}

impl StorageCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Collector for StorageCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Storage
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let mounts_content = fs::read_to_string(self.config.proc_path.join("mounts"))?;
        let mounts = parser::parse_mounts(&mounts_content)?;

        let mut seen = HashSet::new();
        let mut drives = Vec::new();

        for mount in mounts.into_iter().filter(is_reportable) {
            if !seen.insert(mount.mount_point.clone()) {
                continue;
            }

            let host_path = self.config.host_path(&mount.mount_point);
            let stat = match statvfs(&host_path) {
                Ok(stat) => stat,
                Err(e) => {
                    debug!(mount = %mount.mount_point, error = %e, "statvfs failed");
                    continue;
                }
            };

            let fragment = stat.fragment_size() as u64;
            let total_bytes = stat.blocks() as u64 * fragment;
            let free_bytes = stat.blocks_free() as u64 * fragment;
            if total_bytes == 0 {
                continue;
            }

            let device = mount
                .device
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or(mount.device.as_str())
                .to_string();

            drives.push(StorageDrive::from_bytes(
                device,
                mount.mount_point,
                mount.filesystem,
                total_bytes,
                total_bytes.saturating_sub(free_bytes),
            ));
        }

        Ok(MetricUpdate::Storage(drives))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::procfs::testing::FakeRoot;

    fn mount(mount_point: &str, filesystem: &str) -> MountInfo {
        MountInfo {
            device: "/dev/sda1".to_string(),
            mount_point: mount_point.to_string(),
            filesystem: filesystem.to_string(),
        }
    }

    #[test]
    fn test_reportable_mounts() {
        assert!(is_reportable(&mount("/", "ext4")));
        assert!(is_reportable(&mount("/mnt/data", "xfs")));
        assert!(!is_reportable(&mount("/boot/efi", "vfat")));
        assert!(!is_reportable(&mount("/run/user/1000", "ext4")));
        assert!(!is_reportable(&mount("/var/lib/snap/x", "ext4")));
        assert!(!is_reportable(&mount("/media/cd", "squashfs")));
        assert!(!is_reportable(&mount("/tmp", "tmpfs")));
    }

    #[tokio::test]
    async fn test_collects_deduplicated_real_mounts() {
        let root = FakeRoot::new("storage");
        root.write(
            "proc/mounts",
            "/dev/sda1 / ext4 rw 0 0\n\
             proc /proc proc rw 0 0\n\
             /dev/loop0 /snap/core/1 squashfs ro 0 0\n\
             /dev/sda1 / ext4 rw 0 0\n\
             /dev/sdb1 /missing ext4 rw 0 0\n",
        );

        let update = StorageCollector::new(root.config()).collect().await.unwrap();
        let MetricUpdate::Storage(drives) = update else {
            panic!("expected a storage update");
        };

        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].device, "sda1");
        assert_eq!(drives[0].mount_point, "/");
        assert_eq!(drives[0].filesystem, "ext4");
        assert!(drives[0].usage_percent >= 0.0 && drives[0].usage_percent <= 100.0);
    }
}
