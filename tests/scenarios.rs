//! End-to-end scenarios over an in-memory card, exercising the full
//! mount → create → write → read → rename → delete lifecycle.

use std::sync::Arc;

use embedded_fat32::test_support::MemoryCard;
use embedded_fat32::{BlockDevice, Fat32Error, Fat32Volume};

fn mount() -> Fat32Volume {
    let card: Arc<dyn BlockDevice> = Arc::new(MemoryCard::formatted());
    Fat32Volume::mount(card).unwrap()
}

#[test]
fn mount_fails_cleanly_on_an_unformatted_card() {
    let card: Arc<dyn BlockDevice> = Arc::new(MemoryCard::blank(64));
    assert_eq!(Fat32Volume::mount(card).unwrap_err(), Fat32Error::NotFat32);
}

#[test]
fn create_write_read_back_a_file() {
    let mut volume = mount();
    let mut handle = volume.create_file("NOTES.TXT").unwrap();
    let written = volume.write_file(&mut handle, b"the quick brown fox").unwrap();
    assert_eq!(written, 20);

    let mut reopened = volume.find_file("NOTES.TXT").unwrap();
    let mut out = [0u8; 20];
    let read = volume.read_file(&mut reopened, &mut out).unwrap();
    assert_eq!(read, 20);
    assert_eq!(&out, b"the quick brown fox");
}

#[test]
fn a_file_can_be_renamed_and_is_found_under_its_new_name_only() {
    let mut volume = mount();
    let mut handle = volume.create_file("DRAFT.TXT").unwrap();
    volume.write_file(&mut handle, b"v1").unwrap();

    volume.rename_file(&mut handle, "FINAL.TXT").unwrap();

    assert!(volume.find_file("FINAL.TXT").is_ok());
    assert_eq!(volume.find_file("DRAFT.TXT").unwrap_err(), Fat32Error::InvalidFile);
}

#[test]
fn deleting_a_file_frees_its_whole_chain_for_reuse() {
    let mut volume = mount();
    let mut big = volume.create_file("BIG.BIN").unwrap();
    let payload = vec![1u8; 512 * 4];
    volume.write_file(&mut big, &payload).unwrap();

    volume.delete_file(&big).unwrap();
    assert_eq!(volume.find_file("BIG.BIN").unwrap_err(), Fat32Error::InvalidFile);

    let mut replacement = volume.create_file("SMALL.BIN").unwrap();
    volume.write_file(&mut replacement, &payload).unwrap();

    let mut reopened = volume.find_file("SMALL.BIN").unwrap();
    let mut out = vec![0u8; payload.len()];
    volume.read_file(&mut reopened, &mut out).unwrap();
    assert_eq!(out, payload);
}

#[test]
fn enumerating_via_get_nth_file_sees_every_live_entry_once() {
    let mut volume = mount();
    volume.create_file("ONE.TXT").unwrap();
    volume.create_file("TWO.TXT").unwrap();
    volume.create_file("THREE.TXT").unwrap();

    let mut names = std::collections::BTreeSet::new();
    for i in 0..3 {
        let handle = volume.get_nth_file(i).unwrap();
        names.insert(*handle.name());
    }
    assert_eq!(names.len(), 3);
    assert!(volume.get_nth_file(3).is_err());
}

#[test]
fn a_long_name_entry_ahead_of_a_file_is_skipped_during_enumeration() {
    use embedded_fat32::bpb;
    use embedded_fat32::dir;
    use embedded_fat32::sector::SectorBuffer;

    let card = MemoryCard::formatted();
    let volume = bpb::mount(&card).unwrap();
    let mut buf = SectorBuffer::new();
    let mut fat_buf = SectorBuffer::new();

    let lfn_loc = dir::allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
    dir::write_new_entry(&card, &mut buf, lfn_loc, &[0x41u8; 11], embedded_fat32::ATTR_LONG_NAME, 0).unwrap();

    let loc = dir::allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
    let name = embedded_fat32::name::encode("README.TXT").unwrap();
    dir::write_new_entry(&card, &mut buf, loc, &name, embedded_fat32::ATTR_ARCHIVE, 4).unwrap();

    let found = dir::get_nth(&card, &volume, &mut buf, 0).unwrap();
    assert_eq!(found.short_name, name);
    assert!(dir::get_nth(&card, &volume, &mut buf, 1).is_err());
}

#[test]
fn writing_past_a_single_cluster_extends_the_chain_transparently() {
    let mut volume = mount();
    let mut handle = volume.create_file("SPANS.BIN").unwrap();
    let payload = vec![0x42u8; 512 * 3 + 7];
    volume.write_file(&mut handle, &payload).unwrap();

    let mut reopened = volume.find_file("SPANS.BIN").unwrap();
    let mut out = vec![0u8; payload.len()];
    volume.read_file(&mut reopened, &mut out).unwrap();
    assert_eq!(out, payload);
}
