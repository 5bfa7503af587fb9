//! Package descriptor and spec template rendering.

use std::path::Path;
use std::sync::Arc;

use crate::layout::HostId;
use crate::merge::ConfigTree;
use crate::revision::RevisionId;

/// Spec template used when `path_to_spec_file` is not configured.
pub const DEFAULT_SPEC_TEMPLATE: &str = "\
Name:           @@NAME@@
Version:        @@VERSION@@
Release:        1
Summary:        Configuration of host @@HOST@@
License:        Proprietary
BuildArch:      noarch

%description
Configuration files of host @@HOST@@ built from revision @@REVISION@@.

%prep

%build

%install
mkdir -p %{buildroot}
cp -a %{_sourcedir}/files/. %{buildroot}/

%files
%defattr(-,root,root,-)
@@FILES@@
";

/// Directory below the source directory holding the merged files.
pub const FILES_DIR: &str = "files";

/// One packaged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
  /// Path relative to [`FILES_DIR`].
  pub source: String,
  /// Absolute install path.
  pub target: String,
}

/// Everything the packaging tool needs to know about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
  pub name: String,
  pub version: RevisionId,
  pub host: HostId,
  pub files: Vec<FileEntry>,
}

impl Descriptor {
  pub fn for_tree(prefix: &str, host: &HostId, revision: RevisionId, tree: &ConfigTree) -> Self {
    let files = tree
      .iter()
      .map(|(path, _)| FileEntry {
        source: path.to_string(),
        target: format!("/{}", path),
      })
      .collect();
    Self {
      name: format!("{}{}", prefix, host),
      version: revision,
      host: host.clone(),
      files,
    }
  }

  pub fn spec_file_name(&self) -> String {
    format!("{}.spec", self.name)
  }

  /// Substitute the `@@NAME@@`-style tokens; unknown tokens stay as they are.
  pub fn render(&self, template: &str) -> String {
    let files = self
      .files
      .iter()
      .map(|f| format!("\"{}\"", f.target))
      .collect::<Vec<_>>()
      .join("\n");
    let version = self.version.to_string();

    template
      .replace("@@NAME@@", &self.name)
      .replace("@@VERSION@@", &version)
      .replace("@@HOST@@", self.host.as_str())
      .replace("@@REVISION@@", &version)
      .replace("@@FILES@@", &files)
  }
}

/// Read the configured template once per run, or fall back to the built-in one.
pub fn load_template(path: Option<&Path>) -> std::io::Result<Arc<str>> {
  match path {
    Some(path) => Ok(Arc::from(std::fs::read_to_string(path)?)),
    None => Ok(Arc::from(DEFAULT_SPEC_TEMPLATE)),
  }
}
