//! Filesystem path values. A path is a kind (absolute, home-relative, or
//! relative) plus normalized components; `~` is expanded from the `HOME`
//! environment variable at resolution time, never at parse time.

use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::moment::Moment;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{Metamethods, TypeDescriptor, TypeTag, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathKind {
    /// The sentinel kind of the none path (tag zero of the union)
    None,
    Relative,
    Absolute,
    Home,
}

/// A normalized filesystem path value.
#[derive(Clone, Debug)]
pub struct PathValue {
    kind: PathKind,
    components: Vec<Text>,
}

fn path_error(path: &PathValue, err: impl Display) -> RuntimeError {
    RuntimeError::PathError { path: path.to_string(), reason: err.to_string() }
}

/// Normalize in place: `.` drops out, and `..` pops a preceding non-`..`
/// component (a leading run of `..` is preserved).
fn clean_components(components: &mut Vec<Text>) {
    let mut i = 0;
    while i < components.len() {
        let text = components[i].to_string();
        if text.is_empty() || text == "." {
            components.remove(i);
        } else if text == ".." && i > 0 && components[i - 1].to_string() != ".." {
            components.remove(i);
            components.remove(i - 1);
            i -= 1;
        } else {
            i += 1;
        }
    }
}

impl PathValue {
    pub fn none() -> PathValue {
        PathValue { kind: PathKind::None, components: Vec::new() }
    }

    pub fn is_none(&self) -> bool {
        self.kind == PathKind::None
    }

    pub fn root() -> PathValue {
        PathValue { kind: PathKind::Absolute, components: Vec::new() }
    }

    pub fn home() -> PathValue {
        PathValue { kind: PathKind::Home, components: Vec::new() }
    }

    pub fn current() -> PathValue {
        PathValue { kind: PathKind::Relative, components: Vec::new() }
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn components(&self) -> &[Text] {
        &self.components
    }

    /// Parse a path from its textual form. The kind comes from the prefix:
    /// `/` absolute, `~`/`~/` home, anything else relative.
    pub fn from_str(s: &str) -> PathValue {
        let (kind, rest) = if let Some(rest) = s.strip_prefix('/') {
            (PathKind::Absolute, rest)
        } else if s == "~" {
            (PathKind::Home, "")
        } else if let Some(rest) = s.strip_prefix("~/") {
            (PathKind::Home, rest)
        } else if let Some(rest) = s.strip_prefix("./") {
            (PathKind::Relative, rest)
        } else {
            (PathKind::Relative, s)
        };
        let mut components: Vec<Text> = rest
            .split('/')
            .filter(|c| !c.is_empty())
            .map(Text::from_str)
            .collect();
        clean_components(&mut components);
        PathValue { kind, components }
    }

    pub fn from_text(text: &Text) -> PathValue {
        PathValue::from_str(&text.to_string())
    }

    /// Expand a home path against the current `HOME` environment variable.
    /// Other kinds are returned unchanged.
    pub fn expand_home(&self) -> PathValue {
        if self.kind != PathKind::Home {
            return self.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/".into());
        let mut expanded = PathValue::from_str(&home);
        expanded.components.extend(self.components.iter().cloned());
        clean_components(&mut expanded.components);
        expanded
    }

    /// Join a relative path onto this one. Joining an absolute or home path
    /// is rejected.
    pub fn concat(&self, other: &PathValue) -> Result<PathValue, RuntimeError> {
        if other.kind != PathKind::Relative {
            return Err(path_error(
                self,
                format!("cannot concatenate onto the non-relative path {other}"),
            ));
        }
        let mut joined = self.clone();
        joined.components.extend(other.components.iter().cloned());
        clean_components(&mut joined.components);
        Ok(joined)
    }

    /// Resolve to an absolute path, interpreting relative paths against
    /// `relative_to` (or the current directory).
    pub fn resolved(&self, relative_to: Option<&PathValue>) -> Result<PathValue, RuntimeError> {
        match self.kind {
            PathKind::Absolute => Ok(self.clone()),
            PathKind::Home => Ok(self.expand_home()),
            PathKind::None => Ok(self.clone()),
            PathKind::Relative => {
                let base = match relative_to {
                    Some(base) => base.resolved(None)?,
                    None => {
                        let cwd = std::env::current_dir()
                            .map_err(|e| path_error(self, e))?;
                        PathValue::from_str(&cwd.display().to_string())
                    }
                };
                base.concat(self)
            }
        }
    }

    /// Express this path relative to another. Both sides resolve first.
    pub fn relative_to(&self, other: &PathValue) -> Result<PathValue, RuntimeError> {
        let this = self.resolved(None)?;
        let other = other.resolved(None)?;
        let mut shared = 0;
        while shared < this.components.len()
            && shared < other.components.len()
            && this.components[shared].equal(&other.components[shared])
        {
            shared += 1;
        }
        let mut components: Vec<Text> = (shared..other.components.len())
            .map(|_| Text::from_str(".."))
            .collect();
        components.extend(this.components[shared..].iter().cloned());
        Ok(PathValue { kind: PathKind::Relative, components })
    }

    /// The containing directory.
    pub fn parent(&self) -> PathValue {
        let mut parent = self.clone();
        match parent.components.last() {
            Some(last) if last.to_string() != ".." => {
                parent.components.pop();
            }
            _ if self.kind == PathKind::Relative => {
                parent.components.push(Text::from_str(".."));
            }
            _ => {}
        }
        parent
    }

    /// The final component (or the kind's marker for bare roots).
    pub fn base_name(&self) -> Text {
        match self.components.last() {
            Some(last) => last.clone(),
            None => match self.kind {
                PathKind::Absolute => Text::from_str("/"),
                PathKind::Home => Text::from_str("~"),
                _ => Text::from_str("."),
            },
        }
    }

    /// The file extension: everything after the last dot, or after the
    /// first dot when `full` is set. Leading dots of hidden files don't
    /// count.
    pub fn extension(&self, full: bool) -> Text {
        let name = self.base_name().to_string();
        let stem = name.strip_prefix('.').unwrap_or(&name);
        let found = if full { stem.find('.') } else { stem.rfind('.') };
        match found {
            Some(i) => Text::from_str(&stem[i + 1..]),
            None => Text::empty(),
        }
    }

    /// Append one component. Component text containing `/` or `;` is
    /// rejected.
    pub fn with_component(&self, component: &Text) -> Result<PathValue, RuntimeError> {
        let text = component.to_string();
        if text.contains('/') || text.contains(';') {
            return Err(path_error(
                self,
                format!("invalid path component: {text:?}"),
            ));
        }
        let mut extended = self.clone();
        extended.components.push(component.clone());
        clean_components(&mut extended.components);
        Ok(extended)
    }

    /// Swap (or append, when `replace` is false) the extension of the final
    /// component.
    pub fn with_extension(&self, extension: &Text, replace: bool) -> PathValue {
        let mut changed = self.clone();
        let Some(last) = changed.components.pop() else {
            return changed;
        };
        let name = last.to_string();
        let base = if replace {
            let stem = name.strip_prefix('.').unwrap_or(&name);
            match stem.rfind('.') {
                Some(i) => {
                    let cut = name.len() - (stem.len() - i);
                    name[..cut].to_string()
                }
                None => name,
            }
        } else {
            name
        };
        changed
            .components
            .push(Text::from_str(&format!("{base}{}", extension)));
        changed
    }

    fn os_path(&self) -> Result<PathBuf, RuntimeError> {
        let resolved = self.resolved(None)?;
        let mut buf = PathBuf::from("/");
        for component in &resolved.components {
            buf.push(component.to_string());
        }
        Ok(buf)
    }

    // ===== Filesystem queries =====

    pub fn exists(&self) -> bool {
        self.os_path().map(|p| p.exists()).unwrap_or(false)
    }

    fn metadata(&self, follow_symlinks: bool) -> Option<fs::Metadata> {
        let path = self.os_path().ok()?;
        if follow_symlinks {
            fs::metadata(path).ok()
        } else {
            fs::symlink_metadata(path).ok()
        }
    }

    pub fn is_file(&self, follow_symlinks: bool) -> bool {
        self.metadata(follow_symlinks)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false)
    }

    pub fn is_directory(&self, follow_symlinks: bool) -> bool {
        self.metadata(follow_symlinks)
            .map(|m| m.file_type().is_dir())
            .unwrap_or(false)
    }

    pub fn is_symlink(&self) -> bool {
        self.metadata(false)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    pub fn is_pipe(&self, follow_symlinks: bool) -> bool {
        self.metadata(follow_symlinks)
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false)
    }

    pub fn is_socket(&self, follow_symlinks: bool) -> bool {
        self.metadata(follow_symlinks)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false)
    }

    pub fn can_read(&self) -> bool {
        self.os_path()
            .map(|p| fs::File::open(p).is_ok())
            .unwrap_or(false)
    }

    pub fn can_write(&self) -> bool {
        self.os_path()
            .map(|p| fs::OpenOptions::new().append(true).open(p).is_ok())
            .unwrap_or(false)
    }

    pub fn can_execute(&self) -> bool {
        self.metadata(true)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    pub fn modified(&self, follow_symlinks: bool) -> Option<Moment> {
        let meta = self.metadata(follow_symlinks)?;
        Some(Moment::from_unix(meta.mtime(), meta.mtime_nsec() / 1000))
    }

    pub fn accessed(&self, follow_symlinks: bool) -> Option<Moment> {
        let meta = self.metadata(follow_symlinks)?;
        Some(Moment::from_unix(meta.atime(), meta.atime_nsec() / 1000))
    }

    pub fn changed(&self, follow_symlinks: bool) -> Option<Moment> {
        let meta = self.metadata(follow_symlinks)?;
        Some(Moment::from_unix(meta.ctime(), meta.ctime_nsec() / 1000))
    }

    // ===== Reading and writing =====

    /// Read the whole file as text; none when missing or invalid UTF-8.
    pub fn read(&self) -> Option<Text> {
        let bytes = self.read_bytes(None)?;
        let s = String::from_utf8(bytes).ok()?;
        Some(Text::from_string(s))
    }

    /// Read up to `count` bytes (everything when none).
    pub fn read_bytes(&self, count: Option<i64>) -> Option<Vec<u8>> {
        let path = self.os_path().ok()?;
        let mut bytes = fs::read(path).ok()?;
        if let Some(count) = count {
            bytes.truncate(count.max(0) as usize);
        }
        Some(bytes)
    }

    pub fn write(&self, text: &Text, permissions: u32) -> Result<(), RuntimeError> {
        self.write_bytes(&text.utf8_bytes(), permissions)
    }

    pub fn write_bytes(&self, bytes: &[u8], permissions: u32) -> Result<(), RuntimeError> {
        let path = self.os_path()?;
        fs::write(&path, bytes).map_err(|e| path_error(self, e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(permissions))
            .map_err(|e| path_error(self, e))
    }

    pub fn append(&self, text: &Text, permissions: u32) -> Result<(), RuntimeError> {
        self.append_bytes(&text.utf8_bytes(), permissions)
    }

    pub fn append_bytes(&self, bytes: &[u8], permissions: u32) -> Result<(), RuntimeError> {
        use std::os::unix::fs::OpenOptionsExt;
        let path = self.os_path()?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .mode(permissions)
            .open(path)
            .map_err(|e| path_error(self, e))?;
        file.write_all(bytes).map_err(|e| path_error(self, e))
    }

    /// Iterate the file's lines as UTF-8-validated texts; none when the
    /// file can't be opened. Iteration stops at the first invalid line.
    pub fn by_line(&self) -> Option<impl Iterator<Item = Text>> {
        let path = self.os_path().ok()?;
        let file = fs::File::open(path).ok()?;
        let reader = BufReader::new(file);
        Some(
            reader
                .lines()
                .map_while(|line| line.ok().map(|l| Text::from_string(l))),
        )
    }

    // ===== Directory operations =====

    pub fn children(&self, include_hidden: bool) -> Result<Vec<PathValue>, RuntimeError> {
        let path = self.os_path()?;
        let mut children = Vec::new();
        let entries = fs::read_dir(path).map_err(|e| path_error(self, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| path_error(self, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            children.push(self.with_component(&Text::from_str(&name))?);
        }
        children.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(children)
    }

    pub fn files(&self, include_hidden: bool) -> Result<Vec<PathValue>, RuntimeError> {
        Ok(self
            .children(include_hidden)?
            .into_iter()
            .filter(|p| p.is_file(true))
            .collect())
    }

    pub fn subdirectories(&self, include_hidden: bool) -> Result<Vec<PathValue>, RuntimeError> {
        Ok(self
            .children(include_hidden)?
            .into_iter()
            .filter(|p| p.is_directory(true))
            .collect())
    }

    /// Expand shell-style wildcards (`*`, `?`, `[...]`) in the final
    /// component against the parent directory.
    pub fn glob(&self) -> Result<Vec<PathValue>, RuntimeError> {
        let pattern = self.base_name().to_string();
        let parent = self.parent();
        let mut matches = Vec::new();
        for child in parent.children(pattern.starts_with('.'))? {
            if glob_match(&pattern, &child.base_name().to_string()) {
                matches.push(child);
            }
        }
        Ok(matches)
    }

    pub fn remove(&self, ignore_missing: bool) -> Result<(), RuntimeError> {
        let path = self.os_path()?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if ignore_missing && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(())
            }
            Err(e) => Err(path_error(self, e)),
        }
    }

    pub fn create_directory(&self, permissions: u32) -> Result<(), RuntimeError> {
        let path = self.os_path()?;
        fs::create_dir_all(&path).map_err(|e| path_error(self, e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(permissions))
            .map_err(|e| path_error(self, e))
    }

    /// Create a uniquely named directory next to this path, using this
    /// path's base name as the prefix.
    pub fn unique_directory(&self) -> Result<PathValue, RuntimeError> {
        let parent = self.parent().os_path()?;
        let prefix = self.base_name().to_string();
        let prefix = prefix.trim_end_matches('X');
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| path_error(self, e))?;
        Ok(PathValue::from_str(&dir.into_path().display().to_string()))
    }

    /// Write to a uniquely named file next to this path, returning the path
    /// actually written.
    pub fn write_unique(&self, text: &Text) -> Result<PathValue, RuntimeError> {
        let parent = self.parent().os_path()?;
        let prefix = self.base_name().to_string();
        let prefix = prefix.trim_end_matches('X');
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(parent)
            .map_err(|e| path_error(self, e))?;
        file.write_all(&text.utf8_bytes())
            .map_err(|e| path_error(self, e))?;
        let (_, path) = file.keep().map_err(|e| path_error(self, e))?;
        Ok(PathValue::from_str(&path.display().to_string()))
    }

    // ===== Metamethod bodies =====

    pub fn compare(&self, other: &PathValue) -> Ordering {
        let kind_cmp = self.kind.cmp(&other.kind);
        if kind_cmp != Ordering::Equal {
            return kind_cmp;
        }
        for (a, b) in self.components.iter().zip(&other.components) {
            let cmp = a.compare(b);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        self.components.len().cmp(&other.components.len())
    }

    pub fn equal(&self, other: &PathValue) -> bool {
        self.compare(other) == Ordering::Equal
    }

    pub fn hash_value(&self) -> u64 {
        let mut words = vec![self.kind as u64];
        for component in &self.components {
            words.push(component.hash());
        }
        hashing::siphash_words(&words)
    }
}

/// Shell-style wildcard match: `*`, `?`, and `[...]` classes.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn matches(pat: &[char], name: &[char]) -> bool {
        match pat.first() {
            None => name.is_empty(),
            Some('*') => {
                (0..=name.len()).any(|skip| matches(&pat[1..], &name[skip..]))
            }
            Some('?') => !name.is_empty() && matches(&pat[1..], &name[1..]),
            Some('[') => {
                let close = match pat.iter().position(|&c| c == ']') {
                    Some(i) if i > 0 => i,
                    _ => return false,
                };
                let Some(&first) = name.first() else { return false };
                let class = &pat[1..close];
                let (negated, class) = match class.first() {
                    Some('!' | '^') => (true, &class[1..]),
                    _ => (false, class),
                };
                let mut hit = false;
                let mut i = 0;
                while i < class.len() {
                    if i + 2 < class.len() && class[i + 1] == '-' {
                        if class[i] <= first && first <= class[i + 2] {
                            hit = true;
                        }
                        i += 3;
                    } else {
                        if class[i] == first {
                            hit = true;
                        }
                        i += 1;
                    }
                }
                if hit == negated {
                    return false;
                }
                matches(&pat[close + 1..], &name[1..])
            }
            Some(&c) => {
                name.first() == Some(&c) && matches(&pat[1..], &name[1..])
            }
        }
    }
    matches(
        &pattern.chars().collect::<Vec<char>>(),
        &name.chars().collect::<Vec<char>>(),
    )
}

impl Display for PathValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined = self
            .components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join("/");
        match self.kind {
            PathKind::None => write!(f, "!Path"),
            PathKind::Absolute => write!(f, "/{joined}"),
            PathKind::Home => {
                if joined.is_empty() {
                    write!(f, "~/")
                } else {
                    write!(f, "~/{joined}")
                }
            }
            PathKind::Relative => {
                if joined.is_empty() {
                    write!(f, "./")
                } else {
                    write!(f, "./{joined}")
                }
            }
        }
    }
}

impl PartialEq for PathValue {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for PathValue {}

// ===== Type descriptor =====

fn as_path(v: &Value) -> &PathValue {
    match v {
        Value::Path(p) => p,
        other => panic!("expected Path, got {other:?}"),
    }
}

/// The `Path` type descriptor.
pub static PATH: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 24,
        align: 8,
        tag: TypeTag::Opaque { name: "Path".into() },
        metamethods: Metamethods {
            hash: Some(|v, _| as_path(v).hash_value()),
            compare: Some(|x, y, _| as_path(x).compare(as_path(y))),
            equal: Some(|x, y, _| as_path(x).equal(as_path(y))),
            as_text: Some(|obj, colorize, _| match obj {
                None => Text::from_str("Path"),
                Some(v) => {
                    let body = as_path(v).to_string();
                    if colorize {
                        Text::from_str(&format!("\x1b[32m({body})\x1b[m"))
                    } else {
                        Text::from_str(&format!("({body})"))
                    }
                }
            }),
            is_none: Some(|v, _| as_path(v).is_none()),
            serialize: Some(|obj, out, _| {
                let text = as_path(obj).to_string();
                serialize::write_varint(out, text.len() as i64);
                out.extend_from_slice(text.as_bytes());
                Ok(())
            }),
            deserialize: Some(path_deserialize),
        },
    })
});

fn path_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let len = input.read_varint()?;
    let bytes = input.read_bytes(len as usize)?;
    let text = std::str::from_utf8(bytes)
        .map_err(|_| RuntimeError::InvalidData { reason: "invalid UTF-8 in Path" })?;
    Ok(Value::Path(PathValue::from_str(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kinds() {
        assert_eq!(PathValue::from_str("/usr/bin").kind(), PathKind::Absolute);
        assert_eq!(PathValue::from_str("~/notes").kind(), PathKind::Home);
        assert_eq!(PathValue::from_str("./src").kind(), PathKind::Relative);
        assert_eq!(PathValue::from_str("src/main.rs").kind(), PathKind::Relative);
        assert_eq!(PathValue::from_str("../up").kind(), PathKind::Relative);
    }

    #[test]
    fn test_normalization() {
        assert_eq!(PathValue::from_str("/a/./b//c").to_string(), "/a/b/c");
        assert_eq!(PathValue::from_str("/a/b/../c").to_string(), "/a/c");
        assert_eq!(PathValue::from_str("../../x").to_string(), "./../../x");
        assert_eq!(PathValue::from_str("a/../../b").to_string(), "./../b");
    }

    #[test]
    fn test_round_trip() {
        for s in ["/a/b/c", "~/x", "./rel/file.txt", "./", "/"] {
            let path = PathValue::from_str(s);
            let back = PathValue::from_text(&Text::from_str(&path.to_string()));
            assert!(path.equal(&back), "{s} round-trips");
        }
    }

    #[test]
    fn test_concat_rules() {
        let base = PathValue::from_str("/usr");
        let joined = base.concat(&PathValue::from_str("local/bin")).unwrap();
        assert_eq!(joined.to_string(), "/usr/local/bin");
        assert!(base.concat(&PathValue::from_str("/etc")).is_err());
        assert!(base.concat(&PathValue::from_str("~/etc")).is_err());
    }

    #[test]
    fn test_parent_and_base_name() {
        let path = PathValue::from_str("/a/b/c.txt");
        assert_eq!(path.base_name().to_string(), "c.txt");
        assert_eq!(path.parent().to_string(), "/a/b");
        assert_eq!(PathValue::from_str("./").parent().to_string(), "./..");
        assert_eq!(PathValue::from_str("/").base_name().to_string(), "/");
    }

    #[test]
    fn test_extensions() {
        let path = PathValue::from_str("/docs/archive.tar.gz");
        assert_eq!(path.extension(false).to_string(), "gz");
        assert_eq!(path.extension(true).to_string(), "tar.gz");
        assert_eq!(
            PathValue::from_str("/docs/README").extension(false).to_string(),
            ""
        );
        assert_eq!(
            PathValue::from_str("/home/.bashrc").extension(false).to_string(),
            ""
        );
        let renamed = path.with_extension(&Text::from_str(".zip"), true);
        assert_eq!(renamed.to_string(), "/docs/archive.tar.zip");
    }

    #[test]
    fn test_with_component_validation() {
        let base = PathValue::from_str("/tmp");
        assert!(base.with_component(&Text::from_str("ok.txt")).is_ok());
        assert!(base.with_component(&Text::from_str("bad/part")).is_err());
        assert!(base.with_component(&Text::from_str("bad;part")).is_err());
    }

    #[test]
    fn test_home_expansion_is_late_bound() {
        let path = PathValue::from_str("~/notes.txt");
        std::env::set_var("HOME", "/home/alpha");
        assert_eq!(path.expand_home().to_string(), "/home/alpha/notes.txt");
        std::env::set_var("HOME", "/home/beta");
        assert_eq!(path.expand_home().to_string(), "/home/beta/notes.txt");
    }

    #[test]
    fn test_relative_to() {
        let a = PathValue::from_str("/a/b/c/d");
        let b = PathValue::from_str("/a/b/x");
        let rel = a.relative_to(&b).unwrap();
        assert_eq!(rel.to_string(), "./../c/d");
    }

    #[test]
    fn test_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let base = PathValue::from_str(&dir.path().display().to_string());
        let file = base.with_component(&Text::from_str("out.txt")).unwrap();

        assert!(!file.exists());
        file.write(&Text::from_str("hello\nworld\n"), 0o644).unwrap();
        assert!(file.exists());
        assert!(file.is_file(true));
        assert!(!file.is_directory(true));
        assert_eq!(file.read().unwrap().to_string(), "hello\nworld\n");

        file.append(&Text::from_str("more\n"), 0o644).unwrap();
        let lines: Vec<String> =
            file.by_line().unwrap().map(|l| l.to_string()).collect();
        assert_eq!(lines, vec!["hello", "world", "more"]);

        assert!(file.modified(true).is_some());
        file.remove(false).unwrap();
        assert!(!file.exists());
        file.remove(true).unwrap();
        assert!(file.remove(false).is_err());
    }

    #[test]
    fn test_children_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        let base = PathValue::from_str(&dir.path().display().to_string());
        for name in ["a.txt", "b.txt", "c.rs", ".hidden"] {
            base.with_component(&Text::from_str(name))
                .unwrap()
                .write(&Text::from_str("x"), 0o644)
                .unwrap();
        }
        base.with_component(&Text::from_str("subdir"))
            .unwrap()
            .create_directory(0o755)
            .unwrap();

        let children = base.children(false).unwrap();
        assert_eq!(children.len(), 4, "hidden file excluded");
        assert_eq!(base.children(true).unwrap().len(), 5);
        assert_eq!(base.files(false).unwrap().len(), 3);
        assert_eq!(base.subdirectories(false).unwrap().len(), 1);

        let globbed = base
            .with_component(&Text::from_str("*.txt"))
            .unwrap()
            .glob()
            .unwrap();
        let names: Vec<String> =
            globbed.iter().map(|p| p.base_name().to_string()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        let base = PathValue::from_str(&dir.path().display().to_string());
        let template = base.with_component(&Text::from_str("runXXXXXX")).unwrap();
        let unique = template.unique_directory().unwrap();
        assert!(unique.is_directory(true));
        let written = template.write_unique(&Text::from_str("data")).unwrap();
        assert_eq!(written.read().unwrap().to_string(), "data");
        assert!(!written.equal(&template));
    }

    #[test]
    fn test_glob_matcher() {
        assert!(glob_match("*.txt", "file.txt"));
        assert!(!glob_match("*.txt", "file.rs"));
        assert!(glob_match("f?le.*", "file.rs"));
        assert!(glob_match("[a-c]x", "bx"));
        assert!(!glob_match("[a-c]x", "dx"));
        assert!(glob_match("[!a-c]x", "dx"));
    }
}
