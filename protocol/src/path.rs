use {
    anyhow::{bail, Result},
    serde::{de::Error, Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// Normalized relative path inside a synced tree.
///
/// No leading or trailing slash, no empty or dot components. The empty
/// string is reserved for the tree root and is not a valid `TreePath`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TreePath(String);

impl TreePath {
    pub fn new(path: &str) -> Result<Self> {
        check_path(path)?;
        Ok(Self(path.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, file_name: &str) -> Result<TreePath> {
        if file_name.contains('/') {
            bail!("file name cannot contain '/': {file_name:?}");
        }
        check_component(file_name)?;
        Ok(Self(format!("{}/{}", self.0, file_name)))
    }

    pub fn parent(&self) -> Option<TreePath> {
        self.0.rfind('/').map(|pos| Self(self.0[..pos].into()))
    }

    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Wire form of the path: directories are marked with a trailing `/`
    /// before encryption.
    pub fn to_wire(&self, is_dir: bool) -> String {
        if is_dir {
            format!("{}/", self.0)
        } else {
            self.0.clone()
        }
    }

    /// Parses a decrypted wire path, stripping the directory marker.
    pub fn from_wire(path: &str) -> Result<(TreePath, bool)> {
        match path.strip_suffix('/') {
            Some(stripped) => Ok((Self::new(stripped)?, true)),
            None => Ok((Self::new(path)?, false)),
        }
    }
}

fn check_component(component: &str) -> Result<()> {
    if component.is_empty() {
        bail!("path component cannot be empty");
    }
    if component == "." || component == ".." {
        bail!("path cannot contain '.' or '..' components");
    }
    Ok(())
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("path cannot be empty");
    }
    if path.starts_with('/') {
        bail!("path cannot start with '/': {path:?}");
    }
    for component in path.split('/') {
        check_component(component)?;
    }
    Ok(())
}

impl FromStr for TreePath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TreePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        check_path(&s).map_err(D::Error::custom)?;
        Ok(Self(s))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
