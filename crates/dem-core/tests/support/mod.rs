//! Local git remotes for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature};

/// A repository on disk that tests clone from.
pub struct Remote {
    pub repo: Repository,
    pub path: PathBuf,
}

impl Remote {
    /// Create a remote whose default branch is `master`.
    pub fn init(path: &Path) -> Self {
        fs::create_dir_all(path).unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("master");
        let repo = Repository::init_opts(path, &opts).unwrap();
        Self {
            repo,
            path: path.to_path_buf(),
        }
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Write `file` and commit everything on the current branch.
    pub fn commit(&self, file: &str, content: &str) -> Oid {
        fs::write(self.path.join(file), content).unwrap();

        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("dem", "dem@example.com").unwrap();

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .map(|oid| self.repo.find_commit(oid).unwrap());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, file, &tree, &parents)
            .unwrap()
    }

    pub fn tag(&self, name: &str, oid: Oid) {
        let commit = self.repo.find_commit(oid).unwrap();
        self.repo
            .tag_lightweight(name, commit.as_object(), false)
            .unwrap();
    }
}

/// Remote with a `VERSION` file: tag `1.3.0` on the first commit, `master`
/// one commit ahead.
pub fn versioned_remote(path: &Path) -> (Remote, Oid, Oid) {
    let remote = Remote::init(path);
    let release = remote.commit("VERSION", "1.3.0");
    remote.tag("1.3.0", release);
    let head = remote.commit("VERSION", "1.4.0-dev");
    (remote, release, head)
}

pub fn head_of(path: &Path) -> String {
    let repo = Repository::open(path).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    head.id().to_string()
}
