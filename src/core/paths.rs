//! Shared path helpers: `~` / `$VAR` expansion and default locations.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Home directory from `$HOME`, falling back to `/tmp` with a warning.
#[must_use]
pub fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[OVL-CONFIG] WARNING: HOME not set, falling back to /tmp");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

/// `$XDG_CONFIG_HOME/ovl`, or `~/.config/ovl`.
#[must_use]
pub fn config_dir() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map_or_else(|| home_dir().join(".config"), PathBuf::from)
        .join("ovl")
}

/// `$XDG_STATE_HOME/ovl`, or `~/.local/state/ovl`.
#[must_use]
pub fn state_dir() -> PathBuf {
    env::var_os("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map_or_else(|| home_dir().join(".local").join("state"), PathBuf::from)
        .join("ovl")
}

/// Expand a leading `~` and any `$VAR` / `${VAR}` references.
///
/// Unset variables expand to the empty string. The result is normalized
/// syntactically (`.` and `..` components resolved) without touching the
/// filesystem.
#[must_use]
pub fn expand_path(raw: &str) -> PathBuf {
    expand_path_with(raw, |name| env::var(name).ok())
}

pub(crate) fn expand_path_with<F>(raw: &str, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let with_home = if raw == "~" {
        lookup("HOME").unwrap_or_default()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        format!("{}/{rest}", lookup("HOME").unwrap_or_default())
    } else {
        raw.to_string()
    };

    let expanded = expand_vars(&with_home, &lookup);
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        normalize_syntactic(&path)
    } else {
        path
    }
}

fn expand_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = matches!(chars.peek(), Some((_, '{')));
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&(_, n)) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }
        if braced {
            if matches!(chars.peek(), Some((_, '}'))) {
                chars.next();
            } else {
                // Unterminated `${`: keep it literal.
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
        }
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&lookup(&name).unwrap_or_default());
        }
    }
    out
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/ada".to_string()),
            "XDG_CACHE_HOME" => Some("/home/ada/.cache".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expands_tilde_prefix() {
        assert_eq!(
            expand_path_with("~/.cache/wal/wal.json", lookup),
            PathBuf::from("/home/ada/.cache/wal/wal.json")
        );
        assert_eq!(expand_path_with("~", lookup), PathBuf::from("/home/ada"));
    }

    #[test]
    fn expands_plain_and_braced_vars() {
        assert_eq!(
            expand_path_with("$XDG_CACHE_HOME/wal", lookup),
            PathBuf::from("/home/ada/.cache/wal")
        );
        assert_eq!(
            expand_path_with("${HOME}/games", lookup),
            PathBuf::from("/home/ada/games")
        );
    }

    #[test]
    fn unset_var_expands_empty() {
        assert_eq!(
            expand_path_with("/opt/$NOPE/bin", lookup),
            PathBuf::from("/opt/bin")
        );
    }

    #[test]
    fn tilde_in_middle_is_literal() {
        assert_eq!(
            expand_path_with("/data/~backup", lookup),
            PathBuf::from("/data/~backup")
        );
    }

    #[test]
    fn unterminated_brace_is_kept() {
        assert_eq!(
            expand_path_with("/x/${HOME", lookup),
            PathBuf::from("/x/${HOME")
        );
    }

    #[test]
    fn normalizes_parent_components() {
        assert_eq!(
            expand_path_with("~/a/../b/./c", lookup),
            PathBuf::from("/home/ada/b/c")
        );
    }

    #[test]
    fn relative_paths_stay_relative() {
        assert_eq!(
            expand_path_with("script/run.sh", lookup),
            PathBuf::from("script/run.sh")
        );
    }
}
