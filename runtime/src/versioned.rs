use {
    crate::error::{Result, RuntimeError},
    semver::Version,
};

/// One behaviour of an operation, in force from `since` until a newer
/// branch of the same table takes over.
pub struct VersionBranch<F> {
    pub since: (u64, u64, u64),
    pub name: &'static str,
    pub entrypoint: F,
}

impl<F> std::fmt::Debug for VersionBranch<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut builder = f.debug_struct("VersionBranch");
        builder.field("since", &self.since);
        builder.field("name", &self.name);
        builder.finish()
    }
}

impl<F> VersionBranch<F> {
    pub fn since_version(&self) -> Version {
        let (major, minor, patch) = self.since;
        Version::new(major, minor, patch)
    }
}

/// Pick the newest branch of `table` whose threshold `version` meets.
/// Tables list their branches newest first.
pub fn select<'a, F>(table: &'a [VersionBranch<F>], version: &Version) -> Result<&'a VersionBranch<F>> {
    table
        .iter()
        .find(|branch| *version >= branch.since_version())
        .ok_or_else(|| RuntimeError::BadVersion(version.to_string()))
}
