use std::fs;
use std::path::{Path, PathBuf};

const ALLOWED_HOST_TRANSFER_CALLERS: &[&str] = &["src/dispatcher.rs"];

/// Implementations of the capability live here
const HOST_MODULE: &str = "src/host/";

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

#[test]
fn host_transfer_calls_are_limited_to_dispatcher() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let src_root = repo_root.join("src");
    let mut files = Vec::new();
    collect_rust_files(&src_root, &mut files);
    assert!(!files.is_empty(), "no sources found under {}", src_root.display());

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if rel.starts_with(HOST_MODULE) {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") || !trimmed.contains(".transfer(") {
                continue;
            }
            if ALLOWED_HOST_TRANSFER_CALLERS
                .iter()
                .any(|allowed| *allowed == rel)
            {
                continue;
            }
            offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
        }
    }

    assert!(
        offenders.is_empty(),
        "host transfer capability invoked outside the dispatcher:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn session_table_is_only_touched_by_tracker() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rust_files(&repo_root.join("src"), &mut files);

    let offenders: Vec<String> = files
        .iter()
        .filter(|file| !file.ends_with("tracker.rs"))
        .filter(|file| {
            fs::read_to_string(file)
                .map(|content| content.contains("DashMap<ClientId"))
                .unwrap_or(false)
        })
        .map(|file| file.display().to_string())
        .collect();

    assert!(
        offenders.is_empty(),
        "per-client session state kept outside the tracker:\n{}",
        offenders.join("\n")
    );
}
