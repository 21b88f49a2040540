//! Workload identity resolution for cgroup paths and block devices.
//!
//! A cgroup path's textual shape tells us whether it belongs to a Docker
//! container, a systemd service, both, or neither. Container labels come from
//! a [`ContainerLabelCache`] that must be filled before the first cgroup walk;
//! a miss degrades to no labels. Device-mapper names (`dm-N`) are translated
//! to their human-readable names through a lazily filled [`DeviceMapper`].

use ahash::AHashMap as HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::exposition::LabelSet;
use crate::fs::FileSystem;

const DOCKER_PREFIX: &str = "docker/";
const SYSTEM_SLICE_PREFIX: &str = "system.slice/";
const DOCKER_SCOPE_PREFIX: &str = "docker-";
const SCOPE_SUFFIX: &str = ".scope";
const SERVICE_SUFFIX: &str = ".service";

/// Owner category of a cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Container,
    Service,
    ContainerService,
    None,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityKind::Container => "container",
            IdentityKind::Service => "service",
            IdentityKind::ContainerService => "container+service",
            IdentityKind::None => "none",
        };
        f.write_str(s)
    }
}

/// Identity attributed to one cgroup path, with the label fragment to merge
/// into every sample emitted for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub container_id: Option<String>,
    pub service: Option<String>,
    pub labels: LabelSet,
}

impl Identity {
    pub fn kind(&self) -> IdentityKind {
        match (&self.container_id, &self.service) {
            (Some(_), Some(_)) => IdentityKind::ContainerService,
            (Some(_), None) => IdentityKind::Container,
            (None, Some(_)) => IdentityKind::Service,
            (None, None) => IdentityKind::None,
        }
    }
}

/// Labels describing one running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Host PID of the container's init process (0 when unknown).
    pub pid: i64,
}

impl ContainerInfo {
    pub fn labels(&self) -> LabelSet {
        LabelSet::new()
            .with("docker_name", self.name.trim_start_matches('/'))
            .with("docker_image", self.image.as_str())
    }
}

/// Container ID → label fragment, filled once per run.
#[derive(Debug, Clone, Default)]
pub struct ContainerLabelCache {
    labels: HashMap<String, LabelSet>,
    containers: Vec<ContainerInfo>,
}

impl ContainerLabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_containers(containers: Vec<ContainerInfo>) -> Self {
        let mut cache = Self::new();
        for container in containers {
            cache.insert(container);
        }
        cache
    }

    pub fn insert(&mut self, container: ContainerInfo) {
        self.labels
            .insert(container.id.clone(), container.labels());
        self.containers.push(container);
    }

    pub fn get(&self, id: &str) -> Option<&LabelSet> {
        self.labels.get(id)
    }

    /// Containers in the order they were inserted.
    pub fn containers(&self) -> &[ContainerInfo] {
        &self.containers
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Extracts the container ID encoded in a cgroup path, if any.
fn container_id(path: &str) -> Option<&str> {
    if let Some(rest) = path.strip_prefix(DOCKER_PREFIX) {
        let id = rest.split('/').next().unwrap_or_default();
        return Some(id).filter(|id| !id.is_empty());
    }

    let unit = path.strip_prefix(SYSTEM_SLICE_PREFIX)?.split('/').next()?;
    let id = unit.strip_prefix(DOCKER_SCOPE_PREFIX)?;
    let id = id.strip_suffix(SCOPE_SUFFIX).unwrap_or(id);
    Some(id).filter(|id| !id.is_empty())
}

/// Extracts the service name from a cgroup path that starts with
/// `system.slice/` and ends with `.service`: everything in between, nested
/// slices included.
fn service_name(path: &str) -> Option<&str> {
    path.strip_prefix(SYSTEM_SLICE_PREFIX)?
        .strip_suffix(SERVICE_SUFFIX)
        .filter(|name| !name.is_empty())
}

/// Maps cgroup paths to workload identities.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    containers: ContainerLabelCache,
}

impl Correlator {
    pub fn new(containers: ContainerLabelCache) -> Self {
        Self { containers }
    }

    pub fn containers(&self) -> &ContainerLabelCache {
        &self.containers
    }

    /// Classifies a cgroup path relative to its subsystem root.
    ///
    /// The container and service checks are independent: a path can carry
    /// both fragments, container labels first.
    pub fn classify(&self, path: &str) -> Identity {
        let mut identity = Identity::default();

        if let Some(id) = container_id(path) {
            match self.containers.get(id) {
                Some(labels) => identity.labels.extend(labels),
                None => debug!(container_id = id, "no labels cached for container"),
            }
            identity.container_id = Some(id.to_string());
        }

        if let Some(name) = service_name(path) {
            identity.labels.push("service", name);
            identity.service = Some(name.to_string());
        }

        identity
    }
}

/// Lazily filled `dm-N` → real name cache, plus the `major:minor` → device
/// name table used to label block-I/O statistics.
#[derive(Debug, Clone, Default)]
pub struct DeviceMapper {
    names: HashMap<String, String>,
    by_number: HashMap<String, String>,
}

impl DeviceMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the label value for a raw kernel block device name.
    ///
    /// Device-mapper nodes are looked up under
    /// `<sys_root>/block/<dev>/dm/name` the first time they are seen; the
    /// result is reused for the rest of the run. A failed read falls back to
    /// the raw name and is retried on the next encounter.
    pub fn resolve(&mut self, fs: &dyn FileSystem, sys_root: &Path, dev: &str) -> String {
        if dev.len() <= 3 || !dev.starts_with("dm-") {
            return dev.to_string();
        }
        if let Some(name) = self.names.get(dev) {
            return name.clone();
        }

        let path = sys_root.join("block").join(dev).join("dm").join("name");
        match fs.read_to_string(&path) {
            Ok(content) => {
                let name = content.trim().to_string();
                if name.is_empty() {
                    return dev.to_string();
                }
                debug!(device = dev, name = %name, "resolved device-mapper name");
                self.names.insert(dev.to_string(), name.clone());
                name
            }
            Err(e) => {
                debug!(device = dev, error = %e, "device-mapper name unavailable");
                dev.to_string()
            }
        }
    }

    /// Records the device name behind a `major:minor` pair.
    pub fn record_number(&mut self, major_minor: impl Into<String>, name: impl Into<String>) {
        self.by_number.insert(major_minor.into(), name.into());
    }

    /// Device name for a `major:minor` pair, if diskstats has seen it.
    pub fn by_number(&self, major_minor: &str) -> Option<&str> {
        self.by_number.get(major_minor).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;

    fn cache() -> ContainerLabelCache {
        ContainerLabelCache::from_containers(vec![ContainerInfo {
            id: "abc123".into(),
            name: "/web".into(),
            image: "nginx:1.25".into(),
            pid: 4242,
        }])
    }

    #[test]
    fn test_classify_legacy_docker_path() {
        let identity = Correlator::new(cache()).classify("docker/abc123");
        assert_eq!(identity.kind(), IdentityKind::Container);
        assert_eq!(identity.container_id.as_deref(), Some("abc123"));
        assert_eq!(
            identity.labels.to_string(),
            r#"docker_name="web",docker_image="nginx:1.25""#
        );
    }

    #[test]
    fn test_classify_systemd_scope_path() {
        let identity = Correlator::new(cache()).classify("system.slice/docker-abc123.scope");
        assert_eq!(identity.kind(), IdentityKind::Container);
        assert_eq!(identity.container_id.as_deref(), Some("abc123"));
        assert_eq!(identity.labels.get("docker_name"), Some("web"));
    }

    #[test]
    fn test_classify_service_path() {
        let identity = Correlator::new(cache()).classify("system.slice/nginx.service");
        assert_eq!(identity.kind(), IdentityKind::Service);
        assert_eq!(identity.service.as_deref(), Some("nginx"));
        assert_eq!(identity.container_id, None);
        assert_eq!(identity.labels.to_string(), r#"service="nginx""#);
    }

    #[test]
    fn test_classify_container_and_service() {
        let identity = Correlator::new(cache())
            .classify("system.slice/docker-abc123.scope/system.slice/cron.service");
        assert_eq!(identity.kind(), IdentityKind::ContainerService);
        assert_eq!(
            identity.labels.to_string(),
            r#"docker_name="web",docker_image="nginx:1.25",service="docker-abc123.scope/system.slice/cron""#
        );
    }

    #[test]
    fn test_service_name_spans_nested_slices() {
        let correlator = Correlator::new(cache());

        let identity = correlator.classify("system.slice/system-getty.slice/getty@tty1.service");
        assert_eq!(identity.kind(), IdentityKind::Service);
        assert_eq!(identity.service.as_deref(), Some("system-getty.slice/getty@tty1"));

        let identity = correlator.classify("system.slice/foo.service/child");
        assert_eq!(identity.kind(), IdentityKind::None);
        assert!(identity.labels.is_empty());
    }

    #[test]
    fn test_classify_unknown_container_degrades_to_empty_fragment() {
        let identity = Correlator::new(cache()).classify("docker/deadbeef");
        assert_eq!(identity.kind(), IdentityKind::Container);
        assert!(identity.labels.is_empty());
    }

    #[test]
    fn test_classify_no_match() {
        let correlator = Correlator::new(cache());
        for path in ["user.slice/user-1000.slice", "docker", "system.slice/.service", "init.scope"] {
            let identity = correlator.classify(path);
            assert_eq!(identity.kind(), IdentityKind::None, "path {}", path);
            assert!(identity.labels.is_empty());
        }
    }

    #[test]
    fn test_device_mapper_caches_resolved_names() {
        let fs = MockFs::new();
        fs.add_file("/sys/block/dm-3/dm/name", "vg-data\n");
        let mut dm = DeviceMapper::new();

        assert_eq!(dm.resolve(&fs, Path::new("/sys"), "dm-3"), "vg-data");
        assert_eq!(dm.resolve(&fs, Path::new("/sys"), "dm-3"), "vg-data");
        assert_eq!(fs.read_count("/sys/block/dm-3/dm/name"), 1);
    }

    #[test]
    fn test_device_mapper_passes_through_plain_devices() {
        let fs = MockFs::new();
        let mut dm = DeviceMapper::new();
        assert_eq!(dm.resolve(&fs, Path::new("/sys"), "sda"), "sda");
        assert_eq!(dm.resolve(&fs, Path::new("/sys"), "dm-"), "dm-");
        assert_eq!(dm.resolve(&fs, Path::new("/sys"), "dm-9"), "dm-9");
    }
}
