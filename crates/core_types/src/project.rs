use indexmap::IndexMap;

use crate::ProjectFile;

/// Project files keyed by path. Re-inserting a path replaces the file but keeps
/// its original position.
#[derive(Debug, Clone, Default)]
pub struct ProjectFileSet {
    files: IndexMap<String, ProjectFile>,
}

impl ProjectFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: ProjectFile) -> Option<ProjectFile> {
        self.files.insert(file.path.clone(), file)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_vec(self) -> Vec<ProjectFile> {
        self.files.into_values().collect()
    }
}

impl Extend<ProjectFile> for ProjectFileSet {
    fn extend<T: IntoIterator<Item = ProjectFile>>(&mut self, iter: T) {
        for file in iter {
            self.insert(file);
        }
    }
}

impl FromIterator<ProjectFile> for ProjectFileSet {
    fn from_iter<T: IntoIterator<Item = ProjectFile>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
