//! 文件树比较 - 计算需要传输的文件集合及上传范围过滤

use crate::storage::{FileEntry, FileTree};
use regex::Regex;
use std::sync::OnceLock;

/// 允许上传的项目子目录
pub const UPLOAD_DIRS: &[&str] = &["www", "plugins", "hooks", "merges", "res"];

/// 计算需要传输的文件：destination 中存在、且 source 中没有相同 hash 的文件。
///
/// 结果不含目录条目；目录由其中文件的路径隐式创建。
/// `diff(local, remote)` 为上传集合，`diff(remote, local)` 为下载集合。
pub fn diff_trees(destination: &FileTree, source: &FileTree) -> FileTree {
    destination
        .iter()
        .filter(|(_, entry)| !entry.is_dir())
        .filter(|(path, entry)| !is_unchanged(entry, source.get(path.as_str())))
        .map(|(path, entry)| (path.clone(), entry.clone()))
        .collect()
}

fn is_unchanged(entry: &FileEntry, other: Option<&FileEntry>) -> bool {
    match (other, &entry.content_hash) {
        (Some(other), Some(hash)) => other.content_hash.as_ref() == Some(hash),
        _ => false,
    }
}

fn upload_scope() -> &'static Regex {
    static SCOPE: OnceLock<Regex> = OnceLock::new();
    SCOPE.get_or_init(|| {
        let pattern = format!(r"^/(?:[^/]+$|(?:{})/)", UPLOAD_DIRS.join("|"));
        // 模式由常量拼成，不会失败
        Regex::new(&pattern).unwrap()
    })
}

/// 路径是否允许上传：顶层文件或位于允许的子目录中，且不含隐藏（以 "." 开头）的路径段
pub fn is_uploadable(path: &str) -> bool {
    upload_scope().is_match(path) && !path.split('/').any(|segment| segment.starts_with('.'))
}

/// 在 diff 结果上应用上传范围过滤
pub fn filter_upload_scope(tree: FileTree) -> FileTree {
    tree.into_iter()
        .filter(|(path, _)| {
            let keep = is_uploadable(path);
            if !keep {
                tracing::debug!("不在上传范围内，跳过: {}", path);
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[FileEntry]) -> FileTree {
        entries.iter().map(|e| (e.path.clone(), e.clone())).collect()
    }

    #[test]
    fn test_diff_of_identical_trees_is_empty() {
        let t = tree(&[
            FileEntry::file("/config.xml", "1"),
            FileEntry::file("/www/index.html", "2"),
            FileEntry::file("/www/js/app.js", "3"),
        ]);
        assert!(diff_trees(&t, &t).is_empty());
    }

    #[test]
    fn test_diff_never_contains_directories() {
        let local = tree(&[
            FileEntry::dir("/www"),
            FileEntry::dir("/www/css"),
            FileEntry::file("/www/index.html", "1"),
        ]);
        let result = diff_trees(&local, &FileTree::new());
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["/www/index.html"]);
        assert!(result.values().all(|e| !e.is_dir()));
    }

    #[test]
    fn test_diff_is_asymmetric() {
        let a = tree(&[FileEntry::file("/x", "1")]);
        let b = FileTree::new();
        assert_eq!(diff_trees(&a, &b).keys().collect::<Vec<_>>(), vec!["/x"]);
        assert!(diff_trees(&b, &a).is_empty());
    }

    #[test]
    fn test_changed_hash_is_included() {
        let local = tree(&[FileEntry::file("/a.js", "111")]);
        let remote = tree(&[FileEntry::file("/a.js", "222")]);
        let result = diff_trees(&local, &remote);
        assert_eq!(result.len(), 1);
        assert_eq!(result["/a.js"].content_hash.as_deref(), Some("111"));
    }

    #[test]
    fn test_unchanged_hash_is_excluded() {
        let local = tree(&[FileEntry::file("/a.js", "111")]);
        let remote = tree(&[FileEntry::file("/a.js", "111")]);
        assert!(diff_trees(&local, &remote).is_empty());
    }

    #[test]
    fn test_file_replacing_directory_is_included() {
        let local = tree(&[FileEntry::file("/www/lib", "1")]);
        let remote = tree(&[FileEntry::dir("/www/lib")]);
        assert!(diff_trees(&local, &remote).contains_key("/www/lib"));
    }

    #[test]
    fn test_diff_leaves_inputs_untouched() {
        let local = tree(&[FileEntry::dir("/www"), FileEntry::file("/www/a.js", "1")]);
        let remote = tree(&[FileEntry::file("/www/a.js", "1")]);
        let _ = diff_trees(&local, &remote);
        let _ = diff_trees(&remote, &local);
        assert_eq!(local.len(), 2);
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn test_upload_scope() {
        assert!(is_uploadable("/config.xml"));
        assert!(is_uploadable("/package.json"));
        assert!(is_uploadable("/www/index.html"));
        assert!(is_uploadable("/plugins/cordova-plugin-x/plugin.xml"));
        assert!(is_uploadable("/res/android/icon.png"));

        assert!(!is_uploadable("/.monaca/secret.json"));
        assert!(!is_uploadable("/.gitignore"));
        assert!(!is_uploadable("/www/.DS_Store"));
        assert!(!is_uploadable("/www/.cache/a.js"));
        assert!(!is_uploadable("/platforms/android/build.gradle"));
        assert!(!is_uploadable("/wwwroot/index.html"));
    }

    #[test]
    fn test_hidden_path_never_uploaded() {
        let local = tree(&[
            FileEntry::file("/.monaca/secret.json", "new"),
            FileEntry::file("/www/index.html", "new"),
        ]);
        let remote = tree(&[FileEntry::file("/.monaca/secret.json", "old")]);

        let upload = filter_upload_scope(diff_trees(&local, &remote));
        assert_eq!(upload.keys().collect::<Vec<_>>(), vec!["/www/index.html"]);
    }
}
