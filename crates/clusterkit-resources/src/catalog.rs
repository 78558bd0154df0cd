//! Default resources applied per platform

/// Bucket applied on every platform
pub const DEFAULT_BUCKET: &str = "default";

const BUILTIN: &[(&str, &[&str])] = &[
    (DEFAULT_BUCKET, &["open-policy-agent"]),
    (
        "aks",
        &[
            "azure-storage-classes",
            "pod-security-policies",
            "priority-classes",
            "resource-quotas",
            "kube-state-metrics",
            "aks-aad-pod-identity-nmi-mic",
            "aks-acr-docker-secret",
        ],
    ),
    (
        "eks",
        &[
            "aws-auth",
            "eks-calico",
            "rook-cluster",
            "rook-common",
            "rook-operator",
            "rook-blockstore",
            "rook-filestore",
            "ebs-blockstore",
            "efs-filestore",
            "pod-security-policies",
            "priority-classes",
            "resource-quotas",
            "eks-heapster",
            "kube-state-metrics",
            "eks-network-policies",
        ],
    ),
    ("aws", &["ebs-blockstore"]),
    ("vsphere", &["vsphere-volumes"]),
    ("raw", &[]),
    ("vra", &[]),
    ("stacki", &[]),
    ("openstack", &[]),
];

/// Resource names to apply by default on each platform
#[derive(Debug, Clone, Copy)]
pub struct DefaultCatalog {
    entries: &'static [(&'static str, &'static [&'static str])],
}

impl DefaultCatalog {
    /// The catalog shipped with clusterkit
    pub fn builtin() -> Self {
        Self { entries: BUILTIN }
    }

    /// Known platforms, excluding the default bucket
    pub fn platforms(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries
            .iter()
            .map(|(platform, _)| *platform)
            .filter(|p| *p != DEFAULT_BUCKET)
    }

    /// Whether `platform` has an entry
    pub fn knows(&self, platform: &str) -> bool {
        self.entries.iter().any(|(p, _)| *p == platform)
    }

    fn bucket(&self, platform: &str) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }

    /// Defaults for `platforms` in order, followed by the default bucket.
    ///
    /// Unknown platforms contribute nothing. Names may repeat when
    /// platforms share resources; the resource set keeps the first.
    pub fn defaults_for(&self, platforms: &[&str]) -> Vec<&'static str> {
        platforms
            .iter()
            .copied()
            .chain(std::iter::once(DEFAULT_BUCKET))
            .flat_map(|p| self.bucket(p).iter().copied())
            .collect()
    }
}

impl Default for DefaultCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
