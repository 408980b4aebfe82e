//! Project boundary detection.
//!
//! Walks up from a cwd to find the nearest project boundary, identified by
//! markers like CLAUDE.md, .git, package.json, etc. Supplies the algorithm
//! behind the Session data model's "project label (derived from git root or
//! cwd)" field (spec §3).

use std::path::Path;

/// Maximum depth to walk up when searching for boundaries.
pub const MAX_BOUNDARY_DEPTH: usize = 20;

/// Directories that should be skipped during boundary detection: generated
/// or vendored code, not project roots.
pub const IGNORED_DIRECTORIES: &[&str] = &[
    "node_modules",
    "vendor",
    ".git",
    "__pycache__",
    "target",
    "dist",
    "build",
    ".next",
    ".output",
    "venv",
    ".venv",
    "env",
    ".turbo",
    ".cache",
];

/// Project markers in priority order. Lower number = higher priority.
pub const PROJECT_MARKERS: &[(&str, u8)] = &[
    ("CLAUDE.md", 1),
    ("package.json", 2),
    ("Cargo.toml", 2),
    ("pyproject.toml", 2),
    ("go.mod", 2),
    ("pubspec.yaml", 2),
    ("Project.toml", 2),
    ("deno.json", 2),
    (".git", 3),
    ("Makefile", 4),
    ("CMakeLists.txt", 4),
];

/// Paths too broad to be a meaningful project boundary.
pub const DANGEROUS_PATHS: &[&str] = &["/", "/Users", "/home", "/var", "/tmp", "/opt"];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBoundary {
    pub path: String,
    pub marker: String,
    pub priority: u8,
}

/// Finds the nearest project boundary by walking up from `file_path`.
///
/// CLAUDE.md at any level (outside ignored dirs) wins immediately; otherwise
/// the nearest, highest-priority marker wins. Crossing an ignored directory
/// discards any boundary found inside it.
pub fn find_project_boundary(file_path: &str) -> Option<ProjectBoundary> {
    let path = Path::new(file_path);

    if !path.exists() {
        return None;
    }

    let start = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    let mut current = Some(start);
    let mut depth = 0;
    let mut best_boundary: Option<ProjectBoundary> = None;
    let home_dir = dirs::home_dir();

    while let Some(dir) = current {
        if depth >= MAX_BOUNDARY_DEPTH {
            break;
        }

        if let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) {
            if is_ignored_directory(dir_name) {
                best_boundary = None;
                current = dir.parent().map(|p| p.to_path_buf());
                depth += 1;
                continue;
            }
        }

        for (marker, priority) in PROJECT_MARKERS {
            if has_marker(&dir, marker) {
                let boundary = ProjectBoundary {
                    path: dir.to_string_lossy().to_string(),
                    marker: marker.to_string(),
                    priority: *priority,
                };

                if *priority == 1 {
                    return Some(boundary);
                }

                match &best_boundary {
                    None => best_boundary = Some(boundary),
                    Some(existing) if boundary.priority < existing.priority => {
                        best_boundary = Some(boundary);
                    }
                    _ => {}
                }

                break;
            }
        }

        if let Some(ref home) = home_dir {
            if dir == *home {
                break;
            }
        }

        current = dir.parent().map(|p| p.to_path_buf());
        depth += 1;
    }

    best_boundary
}

#[must_use]
pub fn is_ignored_directory(name: &str) -> bool {
    IGNORED_DIRECTORIES.contains(&name)
}

/// Derives the project label the Session Factory needs: git-root basename
/// → cwd basename → `Unknown Project` (spec §4.3).
pub fn derive_project_label(cwd: &str) -> String {
    if let Some(boundary) = find_project_boundary(cwd) {
        if let Some(name) = Path::new(&boundary.path).file_name().and_then(|n| n.to_str()) {
            return name.to_string();
        }
    }
    if let Some(name) = Path::new(cwd).file_name().and_then(|n| n.to_str()) {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    "Unknown Project".to_string()
}

pub fn is_dangerous_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let normalized = if trimmed.is_empty() { "/" } else { trimmed };

    for dangerous in DANGEROUS_PATHS {
        if normalized == *dangerous {
            return Some(format!(
                "Path '{}' is too broad and would encompass many projects",
                path
            ));
        }
    }

    if let Some(home) = dirs::home_dir() {
        if normalized == home.to_string_lossy() {
            return Some(format!("Path '{}' is home directory and too broad", path));
        }
    }

    None
}

fn has_marker(dir: &Path, marker: &str) -> bool {
    dir.join(marker).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_marker_wins_over_repo_root() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let repo_root = temp_dir.path().join("repo");
        let app_dir = repo_root.join("packages").join("app");
        let src_dir = app_dir.join("src");

        std::fs::create_dir_all(&src_dir).expect("create dirs");
        std::fs::create_dir_all(repo_root.join(".git")).expect("create git dir");
        std::fs::write(app_dir.join("package.json"), "{}").expect("write package marker");
        std::fs::write(src_dir.join("main.rs"), "fn main() {}").expect("write file");

        let file_path = src_dir.join("main.rs");
        let boundary =
            find_project_boundary(file_path.to_string_lossy().as_ref()).expect("boundary");

        assert_eq!(boundary.path, app_dir.to_string_lossy());
        assert_eq!(boundary.marker, "package.json");
    }

    #[test]
    fn derive_project_label_falls_back_to_cwd_basename() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let project_dir = temp_dir.path().join("my-cool-app");
        std::fs::create_dir_all(&project_dir).expect("create dir");

        let label = derive_project_label(project_dir.to_string_lossy().as_ref());
        assert_eq!(label, "my-cool-app");
    }

    #[test]
    fn derive_project_label_defaults_when_path_missing() {
        let label = derive_project_label("");
        assert_eq!(label, "Unknown Project");
    }
}
