//! Path policy: which files the engine may touch.
//!
//! Every path entering the engine goes through [`PathPolicy::validate`],
//! which returns the [`AllowedPath`] newtype that the rest of the engine
//! requires. Checks run in two phases:
//!
//! 1. Lexical checks, with no filesystem access: emptiness, `..` traversal,
//!    containment under an allowed root, extension suffix and the denylist.
//! 2. Symlink resolution: the path (or its parent, for files that do not exist
//!    yet) is canonicalised and containment is checked again against the
//!    canonical roots.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use folio_config::Config;
use thiserror::Error;

use crate::error::UpdateError;

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathViolation {
    /// The path was empty.
    #[error("path is empty")]
    Empty,
    /// The path contained a NUL byte.
    #[error("path contains a NUL byte")]
    NulByte,
    /// The path used `..` to escape the allowed roots.
    #[error("path traverses outside the allowed roots")]
    Traversal,
    /// The path is not under any allowed root.
    #[error("path is outside the allowed roots")]
    OutsideRoots,
    /// The file name does not end with an allowed extension.
    #[error("file type is not editable")]
    DisallowedExtension,
    /// The path matched a denylist entry.
    #[error("path matches restricted pattern '{pattern}'")]
    Denied {
        /// The denylist entry that matched.
        pattern: String,
    },
    /// Resolving symlinks led outside the allowed roots.
    #[error("path resolves outside the allowed roots")]
    SymlinkEscape,
}

/// A path that passed [`PathPolicy::validate`].
///
/// Only the policy constructs values of this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllowedPath(PathBuf);

impl AllowedPath {
    /// The resolved path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for AllowedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for AllowedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Clone)]
struct Root {
    lexical: PathBuf,
    canonical: PathBuf,
}

/// Allow-list of editable roots and extensions, plus a denylist.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    roots: Vec<Root>,
    extensions: Vec<String>,
    denied: Vec<String>,
}

impl PathPolicy {
    /// Builds a policy.
    ///
    /// Roots should be absolute; relative roots are kept as given and are
    /// resolved against the working directory only when canonicalised.
    /// Extensions are matched case-insensitively and may carry a leading dot.
    /// The first root is the primary root against which relative request
    /// paths are resolved.
    pub fn new<R, E, D>(roots: R, extensions: E, denied: D) -> Self
    where
        R: IntoIterator,
        R::Item: Into<PathBuf>,
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let roots = roots
            .into_iter()
            .filter_map(|root| {
                let lexical = normalise(&root.into()).ok()?;
                let canonical = fs::canonicalize(&lexical).unwrap_or_else(|_| lexical.clone());
                Some(Root { lexical, canonical })
            })
            .collect();
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        let denied = denied
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().to_ascii_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self {
            roots,
            extensions,
            denied,
        }
    }

    /// Builds the policy from configuration, resolving relative roots
    /// against `base_dir`.
    pub fn from_config(config: &Config, base_dir: &Path) -> Self {
        Self::new(
            config
                .allowed_roots()
                .iter()
                .map(|root| base_dir.join(root.trim())),
            config.allowed_extensions(),
            config.denied_paths(),
        )
    }

    /// The primary root, against which relative paths resolve.
    #[must_use]
    pub fn primary_root(&self) -> Option<&Path> {
        self.roots.first().map(|root| root.lexical.as_path())
    }

    /// Validates `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::PathRejected`] naming the failed check.
    pub fn validate(&self, path: &Path) -> Result<AllowedPath, UpdateError> {
        self.check(path).map_err(|violation| {
            tracing::warn!(
                target: "folio::policy",
                path = %path.display(),
                violation = %violation,
                "path rejected"
            );
            UpdateError::PathRejected {
                path: path.to_path_buf(),
                violation,
            }
        })
    }

    fn check(&self, path: &Path) -> Result<AllowedPath, PathViolation> {
        if path.as_os_str().is_empty() {
            return Err(PathViolation::Empty);
        }
        if path.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(PathViolation::NulByte);
        }

        let joined = match (path.is_absolute(), self.primary_root()) {
            (true, _) => path.to_path_buf(),
            (false, Some(root)) => root.join(path),
            (false, None) => return Err(PathViolation::OutsideRoots),
        };
        let normalised = normalise(&joined).map_err(|()| PathViolation::Traversal)?;
        let climbs = path
            .components()
            .any(|component| matches!(component, Component::ParentDir));

        let Some(root) = self
            .roots
            .iter()
            .find(|root| normalised.starts_with(&root.lexical))
        else {
            return Err(if climbs {
                PathViolation::Traversal
            } else {
                PathViolation::OutsideRoots
            });
        };

        self.check_extension(&normalised)?;
        self.check_denylist(&normalised, &root.lexical)?;

        let resolved = resolve_symlinks(&normalised);
        let Some(target_root) = self
            .roots
            .iter()
            .find(|candidate| resolved.starts_with(&candidate.canonical))
        else {
            return Err(PathViolation::SymlinkEscape);
        };
        self.check_extension(&resolved)?;
        self.check_denylist(&resolved, &target_root.canonical)?;
        Ok(AllowedPath(resolved))
    }

    fn check_extension(&self, path: &Path) -> Result<(), PathViolation> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .ok_or(PathViolation::DisallowedExtension)?;
        let allowed = self.extensions.iter().any(|ext| {
            name.strip_suffix(ext.as_str())
                .and_then(|stem| stem.strip_suffix('.'))
                .is_some_and(|stem| !stem.is_empty())
        });
        if allowed {
            Ok(())
        } else {
            Err(PathViolation::DisallowedExtension)
        }
    }

    fn check_denylist(&self, path: &Path, root: &Path) -> Result<(), PathViolation> {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut slashed = String::from("/");
        for (index, component) in relative.components().enumerate() {
            if index > 0 {
                slashed.push('/');
            }
            slashed.push_str(&component.as_os_str().to_string_lossy());
        }
        let slashed = slashed.to_ascii_lowercase();
        match self
            .denied
            .iter()
            .find(|pattern| slashed.contains(pattern.as_str()))
        {
            Some(pattern) => Err(PathViolation::Denied {
                pattern: pattern.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Resolves `.` and `..` without touching the filesystem.
///
/// Fails when `..` would climb above the filesystem root.
fn normalise(path: &Path) -> Result<PathBuf, ()> {
    let mut normalised = PathBuf::new();
    let mut depth = 0_usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalised.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(());
                }
                normalised.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                normalised.push(part);
                depth += 1;
            }
        }
    }
    Ok(normalised)
}

/// Canonicalises the path, or its parent when the file does not exist yet.
fn resolve_symlinks(path: &Path) -> PathBuf {
    match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let parent = path.parent().and_then(|parent| fs::canonicalize(parent).ok());
            match (parent, path.file_name()) {
                (Some(parent), Some(name)) => parent.join(name),
                _ => path.to_path_buf(),
            }
        }
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Site {
        dir: TempDir,
        policy: PathPolicy,
    }

    impl Site {
        fn views(&self) -> PathBuf {
            self.dir.path().join("resources/views")
        }
    }

    #[fixture]
    fn site() -> Site {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join("resources/views/partials")).expect("views");
        fs::create_dir_all(dir.path().join("resources/lang/vendor")).expect("lang");
        fs::write(dir.path().join("resources/views/home.blade.php"), "<h1>Hi</h1>")
            .expect("home");
        let config = Config::default();
        let policy = PathPolicy::from_config(&config, dir.path());
        Site { dir, policy }
    }

    fn violation(site: &Site, path: &Path) -> PathViolation {
        match site.policy.validate(path) {
            Err(UpdateError::PathRejected { violation, .. }) => violation,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[rstest]
    fn accepts_relative_paths_under_primary_root(site: Site) {
        let allowed = site
            .policy
            .validate(Path::new("home.blade.php"))
            .expect("allowed");
        let expected = fs::canonicalize(site.views().join("home.blade.php")).expect("canon");
        assert_eq!(allowed.as_path(), expected);
    }

    #[rstest]
    fn accepts_new_files_under_existing_directories(site: Site) {
        let path = site.views().join("partials/footer.html");
        let allowed = site.policy.validate(&path).expect("allowed");
        assert!(allowed.as_path().ends_with("partials/footer.html"));
    }

    #[rstest]
    #[case::empty("", PathViolation::Empty)]
    #[case::traversal("../../etc/passwd", PathViolation::Traversal)]
    #[case::deep_traversal(
        "../../../../../../../../../../../../etc/passwd",
        PathViolation::Traversal
    )]
    #[case::absolute_outside("/etc/passwd", PathViolation::OutsideRoots)]
    #[case::extension("home.exe", PathViolation::DisallowedExtension)]
    #[case::bare_extension("php", PathViolation::DisallowedExtension)]
    #[case::env(".env.php", PathViolation::Denied { pattern: "/.env".to_owned() })]
    fn rejects_paths(site: Site, #[case] path: &str, #[case] expected: PathViolation) {
        assert_eq!(violation(&site, Path::new(path)), expected);
    }

    #[rstest]
    fn denylist_applies_below_other_roots(site: Site) {
        let path = site.dir.path().join("resources/lang/vendor/pkg/en.php");
        assert_eq!(
            violation(&site, &path),
            PathViolation::Denied {
                pattern: "/vendor/".to_owned()
            }
        );
    }

    #[rstest]
    fn compound_extensions_are_case_insensitive(site: Site) {
        let path = site.views().join("Welcome.BLADE.PHP");
        assert!(site.policy.validate(&path).is_ok());
    }

    #[rstest]
    fn dot_segments_inside_roots_are_normalised(site: Site) {
        let path = site.views().join("partials/../home.blade.php");
        assert!(site.policy.validate(&path).is_ok());
    }

    #[cfg(unix)]
    #[rstest]
    fn symlinks_leaving_the_roots_are_rejected(site: Site) {
        let outside = TempDir::new().expect("outside");
        fs::write(outside.path().join("secret.html"), "secret").expect("secret");
        std::os::unix::fs::symlink(outside.path(), site.views().join("escape"))
            .expect("symlink");
        let path = site.views().join("escape/secret.html");
        assert_eq!(violation(&site, &path), PathViolation::SymlinkEscape);
    }

    #[cfg(unix)]
    #[rstest]
    fn symlinks_into_denied_paths_are_rejected(site: Site) {
        let denied = site.dir.path().join("resources/lang/vendor/pkg");
        fs::create_dir_all(&denied).expect("vendor package");
        fs::write(denied.join("en.php"), "<?php return ['k' => 'secret'];").expect("en.php");
        std::os::unix::fs::symlink(denied.join("en.php"), site.views().join("link.php"))
            .expect("symlink");
        assert_eq!(
            violation(&site, &site.views().join("link.php")),
            PathViolation::Denied {
                pattern: "/vendor/".to_owned()
            }
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn symlinks_to_disallowed_extensions_are_rejected(site: Site) {
        fs::write(site.views().join("notes.txt"), "private").expect("notes");
        std::os::unix::fs::symlink(site.views().join("notes.txt"), site.views().join("alias.html"))
            .expect("symlink");
        assert_eq!(
            violation(&site, &site.views().join("alias.html")),
            PathViolation::DisallowedExtension
        );
    }

    #[test]
    fn normalise_refuses_to_climb_above_root() {
        assert_eq!(normalise(Path::new("/a/../..")), Err(()));
        assert_eq!(
            normalise(Path::new("/a/./b/../c")),
            Ok(PathBuf::from("/a/c"))
        );
    }
}
