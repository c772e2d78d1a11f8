//! aboot entry point.
//!
//! `boot.S` sets up a stack, clears `.bss` and calls [`aboot_main`] with the
//! registers firmware passed: `r0` (zero), `r1` (machine type) and `r2` (the
//! device tree address).
//!
//! Built for anything other than a bare metal target this is an empty
//! program; all logic lives in the library.

#![cfg_attr(target_os = "none", no_std, no_main)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(target_os = "none")]
mod bare {
    use core::arch::global_asm;
    use core::panic::PanicInfo;

    use aboot::arch::armv7::Armv7;
    use aboot::config::LOG_LEVEL;
    use aboot::console::BootConsole;
    use aboot::drivers::pl011::{Pl011, QVIRT_UART_BASE};
    use aboot::mm::{PhysAddr, Region};

    #[cfg(not(feature = "qvirt"))]
    compile_error!("no board selected; enable the `qvirt` feature");

    global_asm!(include_str!("boot.S"));

    // SAFETY: QEMU virt places the PL011 at this address; it stays identity
    // mapped across the MMU switch.
    static CONSOLE: BootConsole<Pl011> =
        BootConsole::new(unsafe { Pl011::new(QVIRT_UART_BASE) }, LOG_LEVEL);

    extern "C" {
        static __aboot_image_start: u8;
        static __aboot_image_end: u8;
    }

    /// The loader image as placed by `link.ld`, stack included.
    fn image_region() -> Region {
        // SAFETY: Only the addresses are taken, never the values.
        let (start, end) = unsafe {
            (
                &raw const __aboot_image_start as usize as u64,
                &raw const __aboot_image_end as usize as u64,
            )
        };
        Region::from_bounds(PhysAddr::new(start), PhysAddr::new(end))
            .unwrap_or(Region::new(start, 0))
    }

    /// Rust entry, called once from `_start`.
    #[no_mangle]
    pub extern "C" fn aboot_main(_arg0: usize, _machine: usize, fdt: usize) -> ! {
        CONSOLE.install();

        // SAFETY: We run privileged and nothing else touches CP15.
        let mut cpu = unsafe { Armv7::new() };
        // SAFETY: Firmware passes the device tree in r2; the image bounds
        // come from the linker script.
        unsafe { aboot::boot::boot(&CONSOLE, &mut cpu, fdt, image_region()) }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        match info.location() {
            Some(loc) => CONSOLE.fatal(format_args!(
                "{} at {}:{}:{}",
                info.message(),
                loc.file(),
                loc.line(),
                loc.column()
            )),
            None => CONSOLE.fatal(format_args!("{}", info.message())),
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("aboot runs on bare metal ARMv7 only; build with a `*-none-*` target");
}
