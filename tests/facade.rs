//! End-to-end tests of path resolution and the filesystem facade.

mod common;

use std::ffi::OsString;
use std::fs as stdfs;
use std::path::PathBuf;

use common::{Workspace, create_zip, read_zip};
use zipmount::{Error, MountMode, canonicalize, fs};

fn names(list: &[&str]) -> Vec<OsString> {
    list.iter().map(OsString::from).collect()
}

#[test]
fn virtual_edits_round_trip_through_the_facade() {
    let ws = Workspace::new();
    let archive = ws.archive("data.zip");
    create_zip(&archive, &[("train.csv", b"a,b\n1,2\n"), ("images/", b"")]);

    let mut reg = ws.registry();
    let _ = reg.load(&archive, MountMode::ReadWrite).unwrap();

    let csv = fs::read_to_string(&reg, archive.join("train.csv")).unwrap();
    fs::write(&mut reg, archive.join("train.csv"), csv.to_uppercase()).unwrap();
    fs::create_dir_all(&mut reg, archive.join("images/thumbs")).unwrap();
    fs::write(&mut reg, archive.join("images/thumbs/t.png"), b"\x89PNG").unwrap();
    fs::copy(&mut reg, archive.join("train.csv"), archive.join("backup.csv")).unwrap();

    let listing: Vec<_> = fs::read_dir(&reg, &archive)
        .unwrap()
        .into_iter()
        .map(|e| (e.name().clone(), e.is_dir()))
        .collect();
    assert_eq!(
        listing,
        vec![
            (OsString::from("backup.csv"), false),
            (OsString::from("images"), true),
            (OsString::from("train.csv"), false),
        ]
    );

    let _ = reg.unload(&archive).unwrap();
    assert_eq!(
        read_zip(&archive),
        vec![
            ("backup.csv".to_string(), b"A,B\n1,2\n".to_vec()),
            ("images/thumbs/t.png".to_string(), b"\x89PNG".to_vec()),
            ("train.csv".to_string(), b"A,B\n1,2\n".to_vec()),
        ]
    );
}

#[test]
fn real_paths_pass_through() {
    let ws = Workspace::new();
    let plain = ws.dir.path().join("plain.txt");
    stdfs::write(&plain, b"real").unwrap();

    let mut reg = ws.registry();
    let resolved = reg.resolve(&plain).unwrap();
    assert!(!resolved.is_virtual());
    assert_eq!(resolved.physical, stdfs::canonicalize(&plain).unwrap());

    fs::write(&mut reg, &plain, b"still real").unwrap();
    assert_eq!(stdfs::read(&plain).unwrap(), b"still real");

    // Paths that do not exist yet resolve too
    let future = ws.dir.path().join("later/file.txt");
    assert_eq!(
        reg.resolve(&future).unwrap().physical,
        canonicalize(&future).unwrap().into_path_buf()
    );
}

#[test]
fn paths_inside_unloaded_archives_do_not_resolve() {
    let ws = Workspace::new();
    let archive = ws.archive("closed.zip");
    create_zip(&archive, &[("inside.txt", b"x")]);

    let mut reg = ws.registry();
    let err = reg.resolve(archive.join("inside.txt")).unwrap_err();
    assert!(matches!(err, Error::PathResolution { .. }));
    assert!(!fs::exists(&reg, archive.join("inside.txt")));

    // The archive file itself is an ordinary file while unmounted
    assert!(fs::is_file(&reg, &archive));

    let _ = reg.load(&archive, MountMode::ReadOnly).unwrap();
    assert!(fs::is_dir(&reg, &archive));
    assert_eq!(fs::read(&reg, archive.join("inside.txt")).unwrap(), b"x");

    let _ = reg.unload(&archive).unwrap();
    assert!(reg.resolve(archive.join("inside.txt")).is_err());
}

#[test]
fn mount_root_cannot_be_removed() {
    let ws = Workspace::new();
    let archive = ws.archive("root.zip");
    create_zip(&archive, &[("f", b"1")]);

    let mut reg = ws.registry();
    let _ = reg.load(&archive, MountMode::ReadWrite).unwrap();

    assert!(fs::remove_dir_all(&mut reg, &archive).is_err());
    assert!(fs::rename(&mut reg, &archive, ws.archive("moved.zip")).is_err());
    assert!(reg.is_mounted(&archive));
    assert_eq!(reg.is_dirty(&archive), Some(false));
}

#[test]
fn walk_crosses_into_mounted_archives() {
    let ws = Workspace::new();
    let root = ws.dir.path().join("archives");
    let archive = root.join("data.zip");
    create_zip(&archive, &[("sub/", b""), ("sub/b.txt", b"b"), ("a.txt", b"a")]);
    stdfs::create_dir_all(root.join("real")).unwrap();
    stdfs::write(root.join("real/r.txt"), b"r").unwrap();

    let mut reg = ws.registry();
    let _ = reg.load(&archive, MountMode::ReadOnly).unwrap();

    let visited: Vec<(PathBuf, Vec<OsString>, Vec<OsString>)> = fs::walk(&reg, &root)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (e.path, e.dirs, e.files)
        })
        .collect();

    assert_eq!(
        visited,
        vec![
            (root.clone(), names(&["data.zip", "real"]), names(&[])),
            (archive.clone(), names(&["sub"]), names(&["a.txt"])),
            (archive.join("sub"), names(&[]), names(&["b.txt"])),
            (root.join("real"), names(&[]), names(&["r.txt"])),
        ]
    );
}

#[test]
fn walk_leaves_unmounted_archives_as_files() {
    let ws = Workspace::new();
    let root = ws.dir.path().join("archives");
    create_zip(&root.join("closed.zip"), &[("x", b"x")]);

    let reg = ws.registry();
    let visited: Vec<_> = fs::walk(&reg, &root).unwrap().map(|e| e.unwrap()).collect();

    assert_eq!(visited.len(), 1);
    assert_eq!(visited[0].files, names(&["closed.zip"]));
    assert!(visited[0].dirs.is_empty());
}

#[cfg(unix)]
#[test]
fn removing_a_symlink_leaves_its_target() {
    use std::os::unix::fs::symlink;

    let ws = Workspace::new();
    let base = ws.dir.path();
    let precious = base.join("precious");
    stdfs::create_dir(&precious).unwrap();
    stdfs::write(precious.join("data.txt"), b"keep").unwrap();
    let dir_link = base.join("link");
    symlink(&precious, &dir_link).unwrap();

    let target = base.join("t.txt");
    stdfs::write(&target, b"target").unwrap();
    let file_link = base.join("l.txt");
    symlink(&target, &file_link).unwrap();

    let mut reg = ws.registry();
    let resolved = reg.resolve(&dir_link).unwrap();
    assert_eq!(resolved.physical, stdfs::canonicalize(base).unwrap().join("link"));

    // Reads still go through the link
    assert_eq!(fs::read(&reg, dir_link.join("data.txt")).unwrap(), b"keep");
    assert_eq!(fs::read(&reg, &file_link).unwrap(), b"target");

    fs::remove_dir_all(&mut reg, &dir_link).unwrap();
    assert!(stdfs::symlink_metadata(&dir_link).is_err());
    assert_eq!(stdfs::read(precious.join("data.txt")).unwrap(), b"keep");

    fs::remove_file(&mut reg, &file_link).unwrap();
    assert!(stdfs::symlink_metadata(&file_link).is_err());
    assert_eq!(stdfs::read(&target).unwrap(), b"target");
}

#[cfg(unix)]
#[test]
fn renaming_a_symlink_moves_the_link() {
    use std::os::unix::fs::symlink;

    let ws = Workspace::new();
    let base = ws.dir.path();
    let target = base.join("t.txt");
    stdfs::write(&target, b"target").unwrap();
    let link = base.join("l.txt");
    symlink(&target, &link).unwrap();

    let mut reg = ws.registry();
    fs::rename(&mut reg, &link, base.join("moved.txt")).unwrap();

    assert!(stdfs::symlink_metadata(&link).is_err());
    assert!(stdfs::symlink_metadata(base.join("moved.txt")).unwrap().file_type().is_symlink());
    assert_eq!(stdfs::read(&target).unwrap(), b"target");
}
