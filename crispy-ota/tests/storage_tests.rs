// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the storage backends and the image read/write contract.

mod common;

use common::*;
use crispy_ota::storage::{InternalFlash, NOR_SECTOR_SIZE};
use crispy_ota::{Backend, ImageRole, Location, OtaError, OtaStorage, SpiNor, StorageBackend};

#[test]
fn test_internal_round_trip_across_pages() {
    let mut storage = internal_storage();
    let data = pattern(1300, 1);

    download(&mut storage, &data, 100);

    assert_eq!(read_back(&mut storage, ImageRole::Downloaded, 0, data.len()), data);
    // Physical placement: rc_base + dl_offset.
    assert_eq!(storage.flash().bytes(0x4800, 16), &data[..16]);
}

#[test]
fn test_external_round_trip_across_sectors() {
    let mut storage = external_storage();
    let data = pattern(5000, 2);

    download(&mut storage, &data, 128);

    assert_eq!(read_back(&mut storage, ImageRole::Downloaded, 0, data.len()), data);
    let nor = storage.external_device().unwrap().spi();
    assert_eq!(&nor.mem[0x4000..0x4010], &data[..16]);
    assert_eq!(nor.sector_erases(), vec![0x4000, 0x5000]);
}

#[test]
fn test_active_role_always_internal() {
    let mut storage = external_storage();
    let data = pattern(64, 3);

    storage.write(ImageRole::Active, 0, &data).unwrap();

    assert_eq!(storage.locate(ImageRole::Active, 0), Location::Internal(0x800));
    assert_eq!(storage.flash().bytes(0x800, 64), &data[..]);
    assert!(storage.external_device().unwrap().spi().programs().is_empty());
}

#[test]
fn test_backend_fixed_at_construction() {
    assert_eq!(internal_storage().backend(), Backend::Internal);
    assert_eq!(external_storage().backend(), Backend::External);
}

#[test]
fn test_write_at_page_start_erases_page() {
    let mut storage = internal_storage();
    storage.write(ImageRole::Active, 0, &[0x11; 8]).unwrap();
    storage.write(ImageRole::Active, 8, &[0x22; 8]).unwrap();

    // Rewriting the first word of the page wipes the bytes after it.
    storage.write(ImageRole::Active, 0, &[0x33; 4]).unwrap();

    let back = read_back(&mut storage, ImageRole::Active, 0, 16);
    assert_eq!(&back[..4], &[0x33; 4]);
    assert!(back[4..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_write_inside_page_does_not_erase() {
    let mut storage = internal_storage();
    storage.write(ImageRole::Active, 0, &[0x11; 8]).unwrap();
    let erases = storage.flash().erased_pages.len();

    storage.write(ImageRole::Active, 8, &[0x22; 8]).unwrap();

    assert_eq!(storage.flash().erased_pages.len(), erases);
}

#[test]
fn test_chunk_spanning_page_boundary_erases_next_page() {
    let mut storage = internal_storage();
    // Dirty the second page of the ACTIVE area first.
    storage.write(ImageRole::Active, 512, &[0x00; 16]).unwrap();

    storage.write(ImageRole::Active, 0, &pattern(768, 4)).unwrap();

    assert_eq!(read_back(&mut storage, ImageRole::Active, 0, 768), pattern(768, 4));
}

#[test]
fn test_partial_word_padded_with_erased_value() {
    let mut storage = internal_storage();
    storage.write(ImageRole::Active, 0, &[1, 2, 3, 4, 5, 6]).unwrap();

    assert_eq!(storage.flash().bytes(0x800, 8), &[1, 2, 3, 4, 5, 6, 0xFF, 0xFF]);
}

#[test]
fn test_misaligned_internal_write_rejected() {
    let mut storage = internal_storage();
    assert_eq!(
        storage.write(ImageRole::Active, 2, &[0; 4]),
        Err(OtaError::Misaligned { addr: 0x802 })
    );
}

#[test]
fn test_program_in_word_keeps_neighbours() {
    let mut flash = InternalFlash::new(TestFlash::new(FLASH_SIZE));
    flash.erase_unit(0).unwrap();
    flash.write(0, &[0x0F; 8]).unwrap();

    flash.program_in_word(5, &[0x01, 0x02]).unwrap();

    assert_eq!(flash.inner().bytes(0, 8), &[0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x01, 0x02, 0x0F]);
    assert_eq!(
        flash.program_in_word(6, &[0, 0, 0]),
        Err(OtaError::Misaligned { addr: 6 })
    );
}

#[test]
fn test_nor_page_program_split_at_boundary() {
    let mut nor = SpiNor::new(SimNor::new(NOR_SIZE), NoDelay::default());
    let data = pattern(300, 5);

    nor.write(0x1FB0, &data).unwrap();

    let sim = nor.spi();
    assert_eq!(sim.programs(), vec![(0x1FB0, 80), (0x2000, 220)]);
    assert_eq!(
        sim.log,
        vec![
            NorOp::ReadStatus,
            NorOp::WriteEnable,
            NorOp::PageProgram { addr: 0x1FB0, len: 80 },
            NorOp::ReadStatus,
            NorOp::WriteEnable,
            NorOp::PageProgram { addr: 0x2000, len: 220 },
        ]
    );
    assert_eq!(&sim.mem[0x1FB0..0x1FB0 + 300], &data[..]);
}

#[test]
fn test_nor_page_program_split_from_half_page() {
    let mut nor = SpiNor::new(SimNor::new(NOR_SIZE), NoDelay::default());

    nor.write(0x1F80, &pattern(300, 6)).unwrap();

    assert_eq!(nor.spi().programs(), vec![(0x1F80, 128), (0x2000, 172)]);
}

#[test]
fn test_nor_write_spanning_three_pages() {
    let mut nor = SpiNor::new(SimNor::new(NOR_SIZE), NoDelay::default());
    let data = pattern(600, 7);

    nor.write(0x10, &data).unwrap();

    assert_eq!(nor.spi().programs(), vec![(0x10, 240), (0x100, 256), (0x200, 104)]);
    let mut back = vec![0u8; 600];
    nor.read(0x10, &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_sector_erase_coalescing() {
    let mut storage = external_storage();

    storage.write(ImageRole::Downloaded, 0, &[0xAA; 64]).unwrap();
    storage.write(ImageRole::Downloaded, 64, &[0xBB; 64]).unwrap();

    let nor = storage.external_device().unwrap();
    assert_eq!(nor.spi().sector_erases(), vec![0x4000]);
    assert_eq!(nor.last_erased(), Some(0x4000));
}

#[test]
fn test_sector_erase_after_moving_on() {
    let mut storage = external_storage();

    storage.write(ImageRole::Downloaded, 0, &[0xAA; 64]).unwrap();
    storage
        .write(ImageRole::Downloaded, NOR_SECTOR_SIZE, &[0xBB; 64])
        .unwrap();
    storage
        .write(ImageRole::Downloaded, NOR_SECTOR_SIZE + 64, &[0xCC; 64])
        .unwrap();

    let erases = storage.external_device().unwrap().spi().sector_erases();
    assert_eq!(erases, vec![0x4000, 0x5000]);
}

#[test]
fn test_nor_waits_while_busy() {
    let mut sim = SimNor::new(NOR_SIZE);
    sim.busy_after_op = 3;
    let mut nor = SpiNor::new(sim, NoDelay::default());

    nor.write(0x00, &[1; 300]).unwrap();

    let polls = nor
        .spi()
        .log
        .iter()
        .filter(|op| **op == NorOp::ReadStatus)
        .count();
    // One ready poll for the first page, four for the second.
    assert_eq!(polls, 5);
}

#[test]
fn test_nor_stuck_busy_times_out() {
    let mut sim = SimNor::new(NOR_SIZE);
    sim.stuck_busy = true;
    let mut nor = SpiNor::new(sim, NoDelay::default());

    let mut buf = [0u8; 4];
    assert_eq!(nor.read(0, &mut buf), Err(OtaError::StorageTimeout));
    assert!(OtaError::StorageTimeout.is_fatal());
    assert!(!nor.spi().log.iter().any(|op| matches!(op, NorOp::Read { .. })));
}

#[test]
fn test_sector_erase_settles() {
    let mut nor = SpiNor::new(SimNor::new(NOR_SIZE), NoDelay::default());

    nor.erase_sector(0x1234).unwrap();

    let (sim, delay, _) = nor.release();
    assert_eq!(sim.sector_erases(), vec![0x1000]);
    assert!(delay.total_ns >= 100_000_000);
}

#[test]
fn test_erase_chip() {
    let mut storage = external_storage();
    download(&mut storage, &pattern(256, 8), 64);

    storage.erase_chip().unwrap();

    let nor = storage.external_device().unwrap();
    assert!(nor.spi().log.contains(&NorOp::ChipErase));
    assert!(nor.spi().mem.iter().all(|&b| b == 0xFF));
    assert_eq!(nor.last_erased(), None);
}

#[test]
fn test_bus_held_for_each_operation() {
    let nor = SpiNor::with_arbiter(
        SimNor::new(NOR_SIZE),
        NoDelay::default(),
        CountingArbiter::default(),
    );
    let mut storage = OtaStorage::external(TestFlash::new(FLASH_SIZE), nor, LAYOUT);

    storage.write(ImageRole::Downloaded, 0, &[0x5A; 32]).unwrap();
    let mut buf = [0u8; 32];
    storage.read(ImageRole::Downloaded, 0, &mut buf).unwrap();

    let arbiter = storage.external_device().unwrap().arbiter();
    // erase, program, read
    assert_eq!(arbiter.acquisitions, 3);
    assert!(!arbiter.held);
    assert!(!arbiter.nested);
    assert_eq!(buf, [0x5A; 32]);
}

#[test]
fn test_bus_released_on_timeout() {
    let mut sim = SimNor::new(NOR_SIZE);
    sim.stuck_busy = true;
    let mut nor = SpiNor::with_arbiter(sim, NoDelay::default(), CountingArbiter::default());

    assert_eq!(nor.write(0, &[0; 4]), Err(OtaError::StorageTimeout));
    assert!(!nor.arbiter().held);
}

#[test]
fn test_space_available() {
    let storage = internal_storage();
    assert_eq!(storage.space_available(), LAYOUT.dl_max_capacity - LAYOUT.dl_offset);
}
