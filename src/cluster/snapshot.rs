use super::Cluster;

/// Frozen cluster state taken once per invocation.
///
/// There are no mutators: the only way to change placement is to take a
/// [`working_copy`](ClusterSnapshot::working_copy), plan on it and diff the
/// result against this snapshot.
#[derive(Debug)]
pub struct ClusterSnapshot {
    cluster: Cluster,
}

impl ClusterSnapshot {
    pub fn new(mut cluster: Cluster) -> Self {
        cluster.freeze();
        Self { cluster }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Fully independent, unfrozen copy for planning.
    pub fn working_copy(&self) -> Cluster {
        self.cluster.clone()
    }
}

impl AsRef<Cluster> for ClusterSnapshot {
    fn as_ref(&self) -> &Cluster {
        &self.cluster
    }
}

impl From<Cluster> for ClusterSnapshot {
    fn from(cluster: Cluster) -> Self {
        Self::new(cluster)
    }
}
