// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use crispy_ota::Layout;

use crate::flash::FLASH_BASE;

/// Offset of the CRC control block in an application image, right after
/// the 48-entry Cortex-M0+ vector table.
pub const CRC_OFFSET: u32 = 0xC0;

const RAM_START: u32 = 0x2000_0000;
const RAM_END: u32 = 0x2004_2000;
const FLASH_END: u32 = FLASH_BASE + 0x0020_0000;

unsafe extern "C" {
    static __ota_active_base: u32;
    static __ota_download_offset: u32;
    static __ota_download_end: u32;
    static __ota_xnv_download_offset: u32;
    static __ota_xnv_download_end: u32;
}

macro_rules! linker_addr {
    ($sym:ident) => {
        unsafe { &$sym as *const u32 as u32 }
    };
}

/// Layout with the download area on internal flash.
pub fn internal_layout() -> Layout {
    Layout {
        rc_base: linker_addr!(__ota_active_base),
        dl_offset: linker_addr!(__ota_download_offset),
        dl_max_capacity: linker_addr!(__ota_download_end),
        crc_offset: CRC_OFFSET,
    }
}

/// Layout with the download area on the external NOR.
#[cfg_attr(not(feature = "xnv-spi"), allow(dead_code))]
pub fn external_layout() -> Layout {
    Layout {
        rc_base: linker_addr!(__ota_active_base),
        dl_offset: linker_addr!(__ota_xnv_download_offset),
        dl_max_capacity: linker_addr!(__ota_xnv_download_end),
        crc_offset: CRC_OFFSET,
    }
}

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }

    fn is_valid_for_xip_execution(&self) -> bool {
        (RAM_START..=RAM_END).contains(&self.initial_sp)
            && (FLASH_BASE..FLASH_END).contains(&self.reset_vector)
    }
}

/// Initial SP and reset vector of the image at flash offset `rc_base`, if
/// they point where an application can run.
pub fn validate_image(rc_base: u32) -> Option<(u32, u32)> {
    let vt = unsafe { VectorTable::read_from(FLASH_BASE + rc_base) };
    if vt.is_valid_for_xip_execution() {
        Some((vt.initial_sp, vt.reset_vector))
    } else {
        None
    }
}

/// # Safety
/// `rc_base` must hold an image accepted by [`validate_image`].
pub unsafe fn jump(rc_base: u32) -> ! {
    let vtor = FLASH_BASE + rc_base;
    relocate_vector_table(vtor);

    let vt = VectorTable::read_from(vtor);
    jump_to_firmware(vt.initial_sp, vt.reset_vector);
}

unsafe fn relocate_vector_table(addr: u32) {
    cortex_m::interrupt::disable();

    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(addr);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump_to_firmware(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
