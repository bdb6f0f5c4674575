use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monaca_sync_lib::core::{diff_trees, filter_upload_scope};
use monaca_sync_lib::{FileEntry, FileTree};

fn project_tree(files: usize, changed_every: usize) -> FileTree {
    let mut tree = FileTree::new();
    for d in 0..files / 50 {
        let dir = format!("/www/module{}", d);
        tree.insert(dir.clone(), FileEntry::dir(dir));
    }
    for i in 0..files {
        let path = format!("/www/module{}/file{}.js", i / 50, i);
        let hash = if changed_every > 0 && i % changed_every == 0 {
            format!("changed{}", i)
        } else {
            format!("hash{}", i)
        };
        tree.insert(path.clone(), FileEntry::file(path, hash));
    }
    tree
}

fn bench_diff(c: &mut Criterion) {
    let local = project_tree(10_000, 10);
    let remote = project_tree(10_000, 0);

    c.bench_function("diff 10k files", |b| {
        b.iter(|| diff_trees(black_box(&local), black_box(&remote)))
    });

    c.bench_function("upload set 10k files", |b| {
        b.iter(|| filter_upload_scope(diff_trees(black_box(&local), black_box(&remote))))
    });
}

criterion_group!(benches, bench_diff);
criterion_main!(benches);
