use memshare::{MemShare, NodeKind, Stats};
use smb2_compound::info::FileBasicInfo;
use smb2_compound::proto::attr;
use smb2_compound::{Error, NtStatus, Share, ShareConfig};

use async_std::task::block_on;

fn share() -> Share<MemShare> {
    Share::new(MemShare::new(), ShareConfig::default())
}

fn stats(share: &Share<MemShare>) -> Stats {
    share.transport().stats()
}

/// Every request and response buffer went back to its pool, every handle was closed
fn assert_clean(share: &Share<MemShare>) {
    assert_eq!(share.pool().outstanding(), 0);
    assert_eq!(share.transport().outstanding_responses(), 0);
    assert_eq!(block_on(share.transport().open_handles()), 0);
    let stats = stats(share);
    assert_eq!(stats.root_refs, 0);
    assert_eq!(stats.link_refs, 0);
}

fn status_of(err: &Error) -> Option<NtStatus> {
    match *err {
        Error::Status(status) | Error::Unsupported(status) => Some(status),
        _ => None,
    }
}

#[test]
fn root_through_cached_handle() {
    let share = share();
    let out = block_on(share.query_path_info("/")).unwrap();

    assert!(out.info.directory);
    assert!(!out.symlink);
    assert!(!out.adjust_tz);
    assert_eq!(out.info.index_number, 0);

    let stats = stats(&share);
    assert_eq!(stats.direct_exchanges, 1);
    assert_eq!(stats.compound_exchanges, 0);
    assert_clean(&share);
}

#[test]
fn root_without_cached_handle() {
    let share = share();
    share.transport().set_root_handle_cache(false);
    let out = block_on(share.query_path_info("")).unwrap();
    assert!(out.info.directory);

    let stats = stats(&share);
    assert_eq!(stats.direct_exchanges, 0);
    assert_eq!(stats.compound_exchanges, 1);
    assert_clean(&share);
}

#[test]
fn query_file() {
    let share = share();
    block_on(share.transport().add_dir("d")).unwrap();
    block_on(share.transport().add_file("d/f", b"0123456789")).unwrap();

    let out = block_on(share.query_path_info("/d/f")).unwrap();
    assert_eq!(out.info.end_of_file, 10);
    assert_eq!(out.info.number_of_links, 1);
    assert!(!out.info.directory);
    assert_eq!(out.info.index_number, 0);
    assert_eq!(String::from_utf16_lossy(&out.info.file_name), "\\d\\f");
    assert_eq!(stats(&share).compound_exchanges, 1);

    let err = block_on(share.query_path_info("d/missing")).unwrap_err();
    assert_eq!(status_of(&err), Some(NtStatus::OBJECT_NAME_NOT_FOUND));
    assert_eq!(err.errno(), libc::ENOENT);
    assert_clean(&share);
}

#[test]
fn query_symlink_retries_as_reparse_point() {
    let share = share();
    block_on(share.transport().add_symlink("ln", "target")).unwrap();

    let out = block_on(share.query_path_info("ln")).unwrap();
    assert!(out.symlink);
    assert_ne!(out.info.basic.attributes & attr::REPARSE_POINT, 0);
    assert_eq!(out.info.end_of_file, 6);
    assert_eq!(stats(&share).compound_exchanges, 2);
    assert_clean(&share);
}

#[test]
fn mkdir_and_rmdir() {
    let share = share();
    block_on(share.mkdir("d")).unwrap();
    assert_eq!(
        block_on(share.transport().kind_of("d")),
        Some(NodeKind::Directory)
    );

    let err = block_on(share.mkdir("d")).unwrap_err();
    assert_eq!(status_of(&err), Some(NtStatus::OBJECT_NAME_COLLISION));
    assert_eq!(err.errno(), libc::EEXIST);

    let err = block_on(share.mkdir("missing/d")).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);

    block_on(share.mkdir("d/e")).unwrap();
    let err = block_on(share.rmdir("d")).unwrap_err();
    assert_eq!(status_of(&err), Some(NtStatus::DIRECTORY_NOT_EMPTY));
    assert_eq!(err.errno(), libc::ENOTEMPTY);

    block_on(share.rmdir("d/e")).unwrap();
    block_on(share.rmdir("d")).unwrap();
    assert!(block_on(share.transport().names()).is_empty());
    assert_eq!(stats(&share).compound_exchanges, 7);
    assert_clean(&share);
}

#[test]
fn rmdir_of_a_file() {
    let share = share();
    block_on(share.transport().add_file("f", b"")).unwrap();
    let err = block_on(share.rmdir("f")).unwrap_err();
    assert_eq!(err.errno(), libc::ENOTDIR);
    assert_eq!(
        block_on(share.transport().kind_of("f")),
        Some(NodeKind::Regular)
    );
    assert_clean(&share);
}

#[test]
fn mkdir_setinfo_marks_read_only() {
    let share = share();
    block_on(share.mkdir("d")).unwrap();

    let attrs = block_on(share.mkdir_setinfo("d", attr::DIRECTORY));
    assert_eq!(attrs, Some(attr::DIRECTORY | attr::READONLY));
    let attrs = block_on(share.transport().attributes_of("d")).unwrap();
    assert_ne!(attrs & attr::READONLY, 0);
    assert_ne!(attrs & attr::DIRECTORY, 0);

    // swallowed
    assert_eq!(block_on(share.mkdir_setinfo("gone", attr::DIRECTORY)), None);
    assert_clean(&share);
}

#[test]
fn unlink() {
    let share = share();
    let transport = share.transport();
    block_on(transport.add_file("f", b"x")).unwrap();
    block_on(transport.add_dir("d")).unwrap();
    block_on(transport.add_symlink("ln", "f")).unwrap();

    block_on(share.unlink("f")).unwrap();
    assert_eq!(block_on(transport.kind_of("f")), None);

    block_on(share.unlink("ln")).unwrap();
    assert_eq!(block_on(transport.kind_of("ln")), None);

    let err = block_on(share.unlink("d")).unwrap_err();
    assert_eq!(err.errno(), libc::EISDIR);

    let err = block_on(share.unlink("f")).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
    assert_clean(&share);
}

#[test]
fn read_only_file_can_not_be_deleted() {
    let share = share();
    block_on(share.transport().add_file("f", b"x")).unwrap();
    let info = FileBasicInfo {
        attributes: attr::READONLY,
        ..FileBasicInfo::default()
    };
    block_on(share.set_file_info("f", &info)).unwrap();

    let err = block_on(share.unlink("f")).unwrap_err();
    assert_eq!(status_of(&err), Some(NtStatus::CANNOT_DELETE));
    assert_clean(&share);
}

#[test]
fn rename() {
    let share = share();
    let transport = share.transport();
    block_on(transport.add_dir("a")).unwrap();
    block_on(transport.add_file("a/f", b"abc")).unwrap();
    block_on(transport.add_file("old", b"1")).unwrap();
    block_on(transport.add_file("new", b"22")).unwrap();

    block_on(share.rename_path("old", "new")).unwrap();
    assert_eq!(block_on(transport.kind_of("old")), None);
    assert_eq!(block_on(transport.size_of("new")), Some(1));

    block_on(share.rename_path("a", "b")).unwrap();
    assert_eq!(block_on(transport.names()), ["b", "b\\f", "new"]);

    let err = block_on(share.rename_path("missing", "x")).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);

    let err = block_on(share.rename_path("new", "nowhere/x")).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
    assert_clean(&share);
}

#[test]
fn hardlink() {
    let share = share();
    let transport = share.transport();
    block_on(transport.add_file("f", b"data")).unwrap();
    block_on(transport.add_dir("d")).unwrap();

    block_on(share.create_hardlink("f", "d/g")).unwrap();
    assert_eq!(block_on(transport.nlink_of("f")), Some(2));
    let out = block_on(share.query_path_info("d/g")).unwrap();
    assert_eq!(out.info.number_of_links, 2);
    assert_eq!(out.info.end_of_file, 4);

    let err = block_on(share.create_hardlink("f", "d/g")).unwrap_err();
    assert_eq!(status_of(&err), Some(NtStatus::OBJECT_NAME_COLLISION));

    let err = block_on(share.create_hardlink("d", "e")).unwrap_err();
    assert_eq!(err.errno(), libc::EISDIR);

    block_on(share.unlink("f")).unwrap();
    assert_eq!(block_on(transport.nlink_of("d/g")), Some(1));
    assert_clean(&share);
}

#[test]
fn set_path_size() {
    let share = share();
    block_on(share.transport().add_file("f", b"abcdef")).unwrap();
    block_on(share.transport().add_dir("d")).unwrap();

    block_on(share.set_path_size("f", 2)).unwrap();
    assert_eq!(block_on(share.transport().size_of("f")), Some(2));
    block_on(share.set_path_size("f", 8192)).unwrap();
    let out = block_on(share.query_path_info("f")).unwrap();
    assert_eq!(out.info.end_of_file, 8192);
    assert_eq!(out.info.allocation_size, 8192);

    let err = block_on(share.set_path_size("d", 1)).unwrap_err();
    assert_eq!(err.errno(), libc::EISDIR);
    assert_clean(&share);
}

#[test]
fn set_file_info() {
    let share = share();
    block_on(share.transport().add_file("f", b"")).unwrap();
    let before = block_on(share.transport().basic_info_of("f")).unwrap();

    block_on(share.set_file_info("f", &FileBasicInfo::default())).unwrap();
    let stats_noop = stats(&share);
    assert_eq!(stats_noop.compound_exchanges, 0);
    assert_eq!(stats_noop.links_taken, 0);

    let info = FileBasicInfo {
        last_access_time: 42,
        last_write_time: 43,
        ..FileBasicInfo::default()
    };
    block_on(share.set_file_info("f", &info)).unwrap();
    let after = block_on(share.transport().basic_info_of("f")).unwrap();
    assert_eq!(after.last_access_time, 42);
    assert_eq!(after.last_write_time, 43);
    assert_eq!(after.creation_time, before.creation_time);
    assert_eq!(after.attributes, before.attributes);

    let err = block_on(share.set_file_info("missing", &info)).unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);

    let stats = stats(&share);
    assert_eq!(stats.compound_exchanges, 2);
    assert_eq!(stats.links_taken, 2);
    assert_clean(&share);
}

#[test]
fn transport_failure_is_reported() {
    let share = share();
    share.transport().inject_transport_error();

    let err = block_on(share.mkdir("d")).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(block_on(share.transport().kind_of("d")), None);

    block_on(share.mkdir("d")).unwrap();
    assert_clean(&share);
}

#[test]
fn encryption() {
    let share = Share::new(
        MemShare::builder().encryption(true).build(),
        ShareConfig::default(),
    );
    block_on(share.mkdir("d")).unwrap();
    assert_eq!(stats(&share).encrypted_exchanges, 1);

    let mut config = ShareConfig::default();
    config.encrypt(true);
    let share = Share::new(MemShare::new(), config);
    block_on(share.mkdir("d")).unwrap();
    assert_eq!(stats(&share).encrypted_exchanges, 1);

    let share = self::share();
    block_on(share.mkdir("d")).unwrap();
    assert_eq!(stats(&share).encrypted_exchanges, 0);
}

#[test]
fn local_separator_and_reserved_chars() {
    let mut config = ShareConfig::default();
    config.dir_sep('\\').map_reserved_chars(true).backup_intent(true);
    let share = Share::new(MemShare::new(), config);

    block_on(share.mkdir("\\a")).unwrap();
    block_on(share.mkdir("a\\b?")).unwrap();
    assert_eq!(
        block_on(share.transport().names()),
        ["a", "a\\b\u{F025}"]
    );

    let out = block_on(share.query_path_info("\\\\")).unwrap();
    assert!(out.info.directory);
    assert_eq!(stats(&share).direct_exchanges, 1);
    assert_clean(&share);
}

#[test]
fn bad_names_send_nothing() {
    let share = share();
    let err = block_on(share.mkdir("a\0b")).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let long = "x".repeat(libc::PATH_MAX as usize + 1);
    let err = block_on(share.mkdir(&long)).unwrap_err();
    assert!(matches!(err, Error::NameTooLong { .. }));

    assert_eq!(stats(&share).compound_exchanges, 0);
    assert_clean(&share);
}
