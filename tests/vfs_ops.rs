//! End-to-end coverage of the VFS state machine.

use starfs::{NodeKind, Preference, StreamMode, Vfs, VfsError};

#[test]
fn test_create_write_read() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.mkdir("/a/b").unwrap();
    vfs.create_file("/a/b/c.txt").unwrap();
    vfs.write_file("/a/b/c.txt", "hello", false).unwrap();
    assert_eq!(vfs.read_file("/a/b/c.txt").unwrap(), "hello");
}

#[test]
fn test_append_mode() {
    let mut vfs = Vfs::new();
    vfs.create_file("/notes.txt").unwrap();
    vfs.write_file("/notes.txt", "one", false).unwrap();
    vfs.write_file("/notes.txt", "two", true).unwrap();
    assert_eq!(vfs.read_file("/notes.txt").unwrap(), "onetwo");
}

#[test]
fn test_read_write_errors() {
    let mut vfs = Vfs::new();
    assert!(matches!(
        vfs.read_file("/missing.txt"),
        Err(VfsError::Path(_))
    ));
    vfs.mkdir("/dir").unwrap();
    assert!(matches!(vfs.read_file("/dir"), Err(VfsError::InvalidArg(_))));
    assert!(matches!(
        vfs.write_file("/", "data", false),
        Err(VfsError::InvalidArg(_))
    ));
}

#[test]
fn test_mv_into_own_subtree_is_conflict() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.mkdir("/a/b").unwrap();
    let before = vfs.render_tree();
    assert!(matches!(vfs.mv("/a", "/a/b"), Err(VfsError::Conflict)));
    assert!(matches!(vfs.mv("/a", "/a"), Err(VfsError::Conflict)));
    assert_eq!(vfs.render_tree(), before);
}

#[test]
fn test_mv_reparents_and_keeps_index() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/src").unwrap();
    vfs.mkdir("/dst").unwrap();
    vfs.create_file("/src/f.txt").unwrap();
    vfs.write_file("/src/f.txt", "payload", false).unwrap();
    vfs.mv("/src/f.txt", "/dst").unwrap();
    assert!(vfs.resolve("/src/f.txt", Preference::Any).is_none());
    assert_eq!(vfs.read_file("/dst/f.txt").unwrap(), "payload");
    let found = vfs.find_nodes_by_name("f.txt");
    assert_eq!(found.len(), 1);
    assert_eq!(Vfs::path_of(&found[0]), "/dst/f.txt");
}

#[test]
fn test_mv_into_current_parent_is_noop() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/d").unwrap();
    vfs.create_file("/d/x.txt").unwrap();
    vfs.mv("/d/x.txt", "/d").unwrap();
    assert!(vfs.resolve("/d/x.txt", Preference::File).is_some());
}

#[test]
fn test_mv_collision_is_invalid() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.mkdir("/b").unwrap();
    vfs.create_file("/a/f.txt").unwrap();
    vfs.create_file("/b/f.txt").unwrap();
    assert!(matches!(
        vfs.mv("/a/f.txt", "/b"),
        Err(VfsError::InvalidArg(_))
    ));
}

#[test]
fn test_rm_missing_and_root() {
    let mut vfs = Vfs::new();
    assert!(matches!(vfs.rm("/nothing"), Err(VfsError::Path(_))));
    assert!(matches!(vfs.rm("/"), Err(VfsError::Root)));
}

#[test]
fn test_rm_subtree_clears_index() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/docs").unwrap();
    vfs.mkdir("/docs/inner").unwrap();
    vfs.create_file("/docs/inner/deep.txt").unwrap();
    vfs.create_file("/docs/top.txt").unwrap();
    assert_eq!(vfs.find_nodes_by_name("deep.txt").len(), 1);
    vfs.rm("/docs").unwrap();
    assert!(vfs.find_nodes_by_name("deep.txt").is_empty());
    assert!(vfs.find_nodes_by_name("top.txt").is_empty());
    assert!(vfs.find_nodes_by_name("inner").is_empty());
    assert!(vfs.resolve("/docs", Preference::Any).is_none());
}

#[test]
fn test_rename_rules() {
    let mut vfs = Vfs::new();
    vfs.create_file("/a.txt").unwrap();
    vfs.create_file("/b.txt").unwrap();

    // same-name rename succeeds silently
    vfs.rename("/a.txt", "a.txt").unwrap();

    assert!(matches!(
        vfs.rename("/a.txt", "b.txt"),
        Err(VfsError::InvalidArg(_))
    ));
    assert!(matches!(vfs.rename("/", "root"), Err(VfsError::Root)));
    assert!(matches!(
        vfs.rename("/a.txt", "bad/name"),
        Err(VfsError::InvalidArg(_))
    ));
    assert!(matches!(
        vfs.rename("/a.txt", ".."),
        Err(VfsError::InvalidArg(_))
    ));
    assert!(matches!(
        vfs.rename("/missing.txt", "x"),
        Err(VfsError::Path(_))
    ));

    vfs.rename("/a.txt", "c.txt").unwrap();
    assert!(vfs.resolve("/a.txt", Preference::Any).is_none());
    assert!(vfs.find_nodes_by_name("a.txt").is_empty());
    assert_eq!(vfs.find_nodes_by_name("c.txt").len(), 1);
}

#[test]
fn test_rename_file_keeps_directory_twin() {
    let mut vfs = Vfs::new();
    vfs.create_file("/both").unwrap();
    vfs.mkdir("/both").unwrap();
    vfs.rename("/both", "moved").unwrap();
    // Any-preference picked the file slot; the directory keeps the name
    assert!(vfs.resolve("/both", Preference::Directory).is_some());
    assert!(vfs.resolve("/moved", Preference::File).is_some());
}

#[test]
fn test_auto_suffix_and_dual_slots() {
    let mut vfs = Vfs::new();
    let first = vfs.create_file("/note.txt").unwrap();
    let second = vfs.create_file("/note.txt").unwrap();
    assert_eq!(first.borrow().name(), "note.txt");
    assert_eq!(second.borrow().name(), "note(1).txt");

    // a directory may share the name through the other slot
    let dir = vfs.mkdir("/note.txt").unwrap();
    assert_eq!(dir.borrow().name(), "note.txt");
    let resolved = vfs.resolve("/note.txt/", Preference::Any).unwrap();
    assert!(resolved.borrow().is_dir());
    let file = vfs.resolve("/note.txt", Preference::Any).unwrap();
    assert!(file.borrow().is_file());

    assert_eq!(vfs.find_nodes_by_name("note.txt").len(), 2);
}

#[test]
fn test_unique_name_shapes() {
    let mut vfs = Vfs::new();
    vfs.create_file("/archive.tar.gz").unwrap();
    let n = vfs.create_file("/archive.tar.gz").unwrap();
    assert_eq!(n.borrow().name(), "archive.tar(1).gz");

    vfs.create_file("/.hidden").unwrap();
    let hidden = vfs.create_file("/.hidden").unwrap();
    assert_eq!(hidden.borrow().name(), ".hidden(1)");

    vfs.mkdir("/v1.0").unwrap();
    let dir = vfs.mkdir("/v1.0").unwrap();
    assert_eq!(dir.borrow().name(), "v1.0(1)");

    let third = vfs.create_file("/.hidden").unwrap();
    assert_eq!(third.borrow().name(), ".hidden(2)");
}

#[test]
fn test_exclusive_creation() {
    let mut vfs = Vfs::new();
    vfs.create_file_exclusive("/only.txt").unwrap();
    assert!(matches!(
        vfs.create_file_exclusive("/only.txt"),
        Err(VfsError::AlreadyExists(_))
    ));
    vfs.mkdir_exclusive("/only-dir").unwrap();
    assert!(matches!(
        vfs.mkdir_exclusive("/only-dir"),
        Err(VfsError::AlreadyExists(_))
    ));
}

#[test]
fn test_cd_semantics() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.create_file("/f.txt").unwrap();
    vfs.cd("/a").unwrap();
    assert_eq!(vfs.pwd(), "/a");
    assert!(matches!(vfs.cd("/f.txt"), Err(VfsError::InvalidArg(_))));
    assert!(matches!(vfs.cd("/missing"), Err(VfsError::Path(_))));
}

#[test]
fn test_cp_file_variants() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/dir").unwrap();
    vfs.create_file("/src.txt").unwrap();
    vfs.write_file("/src.txt", "body", false).unwrap();

    // into an existing directory, under the source name
    vfs.cp("/src.txt", "/dir").unwrap();
    assert_eq!(vfs.read_file("/dir/src.txt").unwrap(), "body");

    // onto an existing file: lands next to it with a suffixed name
    vfs.create_file("/taken.txt").unwrap();
    vfs.cp("/src.txt", "/taken.txt").unwrap();
    assert_eq!(vfs.read_file("/taken(1).txt").unwrap(), "body");

    // to a fresh name
    vfs.cp("/src.txt", "/dir/fresh.txt").unwrap();
    assert_eq!(vfs.read_file("/dir/fresh.txt").unwrap(), "body");
}

#[test]
fn test_cp_directory_is_deep_and_independent() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/tree").unwrap();
    vfs.mkdir("/tree/sub").unwrap();
    vfs.create_file("/tree/sub/leaf.txt").unwrap();
    vfs.write_file("/tree/sub/leaf.txt", "v1", false).unwrap();

    vfs.cp("/tree", "/copy").unwrap();
    assert_eq!(vfs.read_file("/copy/sub/leaf.txt").unwrap(), "v1");

    vfs.write_file("/tree/sub/leaf.txt", "v2", false).unwrap();
    assert_eq!(vfs.read_file("/copy/sub/leaf.txt").unwrap(), "v1");

    // both leaves are indexed under the same name
    assert_eq!(vfs.find_nodes_by_name("leaf.txt").len(), 2);
}

#[test]
fn test_cp_into_own_subtree_is_conflict() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.mkdir("/a/b").unwrap();
    assert!(matches!(vfs.cp("/a", "/a/b"), Err(VfsError::Conflict)));
}

#[test]
fn test_find_reflects_every_mutation() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/x").unwrap();
    vfs.create_file("/x/same").unwrap();
    vfs.mkdir("/y").unwrap();
    vfs.mkdir("/y/same").unwrap();
    assert_eq!(vfs.find_nodes_by_name("same").len(), 2);

    vfs.rename("/x/same", "other").unwrap();
    assert_eq!(vfs.find_nodes_by_name("same").len(), 1);
    assert_eq!(vfs.find_nodes_by_name("other").len(), 1);

    vfs.rm("/y/same").unwrap();
    assert!(vfs.find_nodes_by_name("same").is_empty());
    assert!(vfs.find_nodes_by_name("missing").is_empty());
}

#[test]
fn test_compress_directory_recursively() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/docs").unwrap();
    vfs.create_file("/docs/a.txt").unwrap();
    vfs.create_file("/docs/b.txt").unwrap();
    vfs.mkdir("/docs/reports").unwrap();
    vfs.create_file("/docs/reports/q1.txt").unwrap();
    vfs.write_file("/docs/a.txt", "alpha", false).unwrap();
    vfs.write_file("/docs/b.txt", "beta", false).unwrap();
    vfs.write_file("/docs/reports/q1.txt", "inner", false).unwrap();

    vfs.compress("/docs").unwrap();
    let node = vfs.resolve("/docs/a.txt", Preference::File).unwrap();
    {
        let guard = node.borrow();
        let bytes = guard.content().bytes();
        assert!(bytes.len() >= 13);
        assert_eq!(&bytes[..3], b"CMP");
    }

    vfs.decompress("/docs").unwrap();
    assert_eq!(vfs.read_file("/docs/a.txt").unwrap(), "alpha");
    assert_eq!(vfs.read_file("/docs/b.txt").unwrap(), "beta");
    assert_eq!(vfs.read_file("/docs/reports/q1.txt").unwrap(), "inner");
}

#[test]
fn test_compress_skips_compressed_files() {
    let mut vfs = Vfs::new();
    vfs.create_file("/f.txt").unwrap();
    vfs.write_file("/f.txt", "abcabcabc", false).unwrap();
    vfs.compress("/f.txt").unwrap();
    let after_first = vfs.read_file("/f.txt").unwrap();
    let stamp = vfs.stat("/f.txt").unwrap().modified_at;
    vfs.compress("/f.txt").unwrap();
    assert_eq!(vfs.read_file("/f.txt").unwrap(), after_first);
    assert_eq!(vfs.stat("/f.txt").unwrap().modified_at, stamp);
}

#[test]
fn test_decompress_skips_plain_files() {
    let mut vfs = Vfs::new();
    vfs.create_file("/plain.txt").unwrap();
    vfs.write_file("/plain.txt", "sample", false).unwrap();
    vfs.decompress("/plain.txt").unwrap();
    assert_eq!(vfs.read_file("/plain.txt").unwrap(), "sample");
}

#[test]
fn test_compress_missing_path() {
    let mut vfs = Vfs::new();
    assert!(matches!(vfs.compress("/missing"), Err(VfsError::Path(_))));
    assert!(matches!(vfs.decompress("/missing"), Err(VfsError::Path(_))));
}

#[test]
fn test_stats_track_content() {
    let mut vfs = Vfs::new();
    vfs.create_file("/stats.txt").unwrap();
    let created = vfs.stat("/stats.txt").unwrap();
    assert_eq!(created.byte_size, 0);
    assert!(created.created_at > 0);

    vfs.write_file("/stats.txt", "héllo", false).unwrap();
    let written = vfs.stat("/stats.txt").unwrap();
    assert_eq!(written.byte_size, 6);
    assert_eq!(written.char_count, 5);
    assert_eq!(written.created_at, created.created_at);
}

#[test]
fn test_save_json_snapshot() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/a").unwrap();
    vfs.create_file("/a/file.txt").unwrap();
    vfs.mkdir("/a/sub").unwrap();
    vfs.save_json("/state.json").unwrap();

    let text = vfs.read_file("/state.json").unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["name"], "/");
    assert_eq!(value["type"], "folder");

    let children = value["children"].as_array().unwrap();
    let a = children.iter().find(|c| c["name"] == "a").unwrap();
    assert_eq!(a["type"], "folder");
    let a_children = a["children"].as_array().unwrap();
    assert!(a_children
        .iter()
        .any(|c| c["name"] == "file.txt" && c["type"] == "file"));
    assert!(a_children
        .iter()
        .any(|c| c["name"] == "sub" && c["type"] == "folder"));

    // the snapshot itself lives inside the VFS and is overwritable
    vfs.save_json("/state.json").unwrap();
    let again = vfs.read_file("/state.json").unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&again).unwrap();
    let top = reparsed["children"].as_array().unwrap();
    assert!(top.iter().any(|c| c["name"] == "state.json"));
}

#[test]
fn test_save_json_escaping() {
    let mut vfs = Vfs::new();
    vfs.create_file(r#"/qu"ote.txt"#).unwrap();
    vfs.save_json("/dump.json").unwrap();
    let text = vfs.read_file("/dump.json").unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let children = value["children"].as_array().unwrap();
    assert!(children.iter().any(|c| c["name"] == r#"qu"ote.txt"#));
}

#[test]
fn test_list_marks_kinds() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/d").unwrap();
    vfs.create_file("/d.txt").unwrap();
    let entries = vfs.list("/").unwrap();
    assert!(entries.contains(&("d".to_string(), NodeKind::Directory)));
    assert!(entries.contains(&("d.txt".to_string(), NodeKind::File)));
    assert!(matches!(vfs.list("/d.txt"), Err(VfsError::InvalidArg(_))));
    assert!(matches!(vfs.list("/nope"), Err(VfsError::Path(_))));
}

#[test]
fn test_file_stream_over_vfs() {
    let mut vfs = Vfs::new();
    vfs.create_file("/lines.txt").unwrap();
    vfs.write_file("/lines.txt", "first\nsecond\n", false).unwrap();

    let lines = vfs
        .with_file_stream("/lines.txt", StreamMode::ReadOnly, 4, |stream| {
            let mut out = Vec::new();
            while !stream.eof() {
                out.push(stream.read_line()?);
            }
            Ok(out)
        })
        .unwrap();
    assert_eq!(lines[..2], ["first".to_string(), "second".to_string()]);

    vfs.with_file_stream("/lines.txt", StreamMode::ReadWrite, 8, |stream| {
        stream.seek(0)?;
        stream.write_str("FIRST")?;
        Ok(())
    })
    .unwrap();
    assert_eq!(vfs.read_file("/lines.txt").unwrap(), "FIRST\nsecond\n");
}

#[test]
fn test_find_returns_directories_too() {
    let mut vfs = Vfs::new();
    vfs.mkdir("/d1").unwrap();
    vfs.mkdir("/d1/shared").unwrap();
    vfs.mkdir("/d2").unwrap();
    vfs.create_file("/d2/shared").unwrap();
    let nodes = vfs.find_nodes_by_name("shared");
    assert_eq!(nodes.len(), 2);
    let kinds: Vec<bool> = nodes.iter().map(|n| n.borrow().is_dir()).collect();
    assert!(kinds.contains(&true));
    assert!(kinds.contains(&false));
}
