//! Linux fbdev device (`/dev/fbN`) driven through ioctls and a shared mapping.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use super::device::{DeviceError, FramebufferDevice, VideoMode};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOPUT_VSCREENINFO: libc::c_ulong = 0x4601;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;
const FBIOPAN_DISPLAY: libc::c_ulong = 0x4606;

/// Apply the variable screen info now.
const FB_ACTIVATE_NOW: u32 = 0;

const KDSETMODE: libc::c_ulong = 0x4B3A;
const KD_TEXT: libc::c_int = 0x00;
const KD_GRAPHICS: libc::c_int = 0x01;

/// Active virtual console.
const CONSOLE: &str = "/dev/tty0";

const HIDE_CURSOR: &[u8] = b"\x1b[?25l";
const SHOW_CURSOR: &[u8] = b"\x1b[?25h";

#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Default)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// `struct fb_var_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Default)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Default)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    kind: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

/// How the console cursor was hidden, so it can be shown the same way.
#[derive(Debug)]
enum Cursor {
    Shown,
    /// Console switched to graphics mode; it draws no text or cursor.
    Graphics(File),
    /// DECTCEM hide written to the terminal on stdout.
    Escape,
}

fn set_console_mode(console: &File, mode: libc::c_int) -> io::Result<()> {
    // SAFETY: KDSETMODE takes its argument by value.
    let ret = unsafe { libc::ioctl(console.as_raw_fd(), KDSETMODE as _, mode) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn write_terminal(sequence: &[u8]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(sequence)?;
    out.flush()
}

/// A Linux framebuffer device node.
pub struct LinuxFramebuffer {
    path: PathBuf,
    file: File,
    mapping: Option<Mapping>,
    cursor: Cursor,
}

impl LinuxFramebuffer {
    /// Open the device node for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        log::debug!("Opened framebuffer {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mapping: None,
            cursor: Cursor::Shown,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is the repr(C) struct the request reads or writes and
        // outlives the call; the descriptor is owned by `self.file`.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg as *mut T) };
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn var_info(&self) -> io::Result<FbVarScreeninfo> {
        let mut var = FbVarScreeninfo::default();
        self.ioctl(FBIOGET_VSCREENINFO, &mut var)?;
        Ok(var)
    }

    fn fix_info(&self) -> io::Result<FbFixScreeninfo> {
        let mut fix = FbFixScreeninfo::default();
        self.ioctl(FBIOGET_FSCREENINFO, &mut fix)?;
        Ok(fix)
    }

    /// Prefer graphics mode on the console; fall back to the escape sequence
    /// when the console cannot be switched but stdout is a terminal.
    fn hide_cursor() -> io::Result<Cursor> {
        let console = OpenOptions::new()
            .write(true)
            .open(CONSOLE)
            .and_then(|console| set_console_mode(&console, KD_GRAPHICS).map(|()| console));
        match console {
            Ok(console) => Ok(Cursor::Graphics(console)),
            Err(e) if io::stdout().is_terminal() => {
                log::debug!("{}: {}; hiding the cursor with an escape sequence", CONSOLE, e);
                write_terminal(HIDE_CURSOR)?;
                Ok(Cursor::Escape)
            }
            Err(e) => Err(e),
        }
    }
}

impl FramebufferDevice for LinuxFramebuffer {
    fn mode(&self) -> Result<VideoMode, DeviceError> {
        let var = self.var_info()?;
        let fix = self.fix_info()?;
        Ok(VideoMode {
            width: var.xres,
            height: var.yres,
            virtual_height: var.yres_virtual,
            bits_per_pixel: var.bits_per_pixel,
            line_length: fix.line_length,
        })
    }

    fn set_mode(&mut self, mode: &VideoMode) -> Result<VideoMode, DeviceError> {
        if self.mapping.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "Mode change while framebuffer is mapped",
            )
            .into());
        }
        let mut var = self.var_info()?;
        var.xres = mode.width;
        var.yres = mode.height;
        var.xres_virtual = mode.width;
        var.yres_virtual = mode.virtual_height.max(mode.height);
        var.xoffset = 0;
        var.yoffset = 0;
        var.bits_per_pixel = mode.bits_per_pixel;
        var.activate = FB_ACTIVATE_NOW;
        self.ioctl(FBIOPUT_VSCREENINFO, &mut var)?;

        let active = self.mode()?;
        log::debug!("{}: mode set to {}", self.path.display(), active);
        Ok(active)
    }

    fn map(&mut self) -> Result<(), DeviceError> {
        if self.mapping.is_some() {
            return Ok(());
        }
        let len = self.mode()?.buffer_size();
        let smem_len = self.fix_info()?.smem_len as usize;
        if smem_len < len {
            return Err(DeviceError::BufferTooSmall {
                required: len,
                actual: smem_len,
            });
        }

        // SAFETY: a fresh shared mapping of the device; the kernel validates
        // the length against the device memory.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(DeviceError::Map(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| DeviceError::Map(io::Error::other("mmap returned null")))?;
        self.mapping = Some(Mapping { ptr, len });
        Ok(())
    }

    fn memory(&mut self) -> Option<&mut [u8]> {
        let mapping = self.mapping.as_ref()?;
        // SAFETY: the mapping is live until `unmap`, which needs `&mut self`,
        // so the slice cannot outlive it.
        Some(unsafe { std::slice::from_raw_parts_mut(mapping.ptr.as_ptr(), mapping.len) })
    }

    fn pan(&mut self, y_offset: u32) -> Result<(), DeviceError> {
        let mut var = self.var_info()?;
        var.xoffset = 0;
        var.yoffset = y_offset;
        self.ioctl(FBIOPAN_DISPLAY, &mut var)?;
        Ok(())
    }

    fn set_cursor_visible(&mut self, visible: bool) -> Result<(), DeviceError> {
        match (visible, &self.cursor) {
            (false, Cursor::Shown) => self.cursor = Self::hide_cursor()?,
            (true, Cursor::Graphics(console)) => {
                set_console_mode(console, KD_TEXT)?;
                self.cursor = Cursor::Shown;
            }
            (true, Cursor::Escape) => {
                write_terminal(SHOW_CURSOR)?;
                self.cursor = Cursor::Shown;
            }
            _ => {}
        }
        Ok(())
    }

    fn unmap(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            // SAFETY: `mapping` came from a successful mmap of `len` bytes
            // and no slice into it survives `&mut self`.
            let ret = unsafe { libc::munmap(mapping.ptr.as_ptr().cast(), mapping.len) };
            if ret == -1 {
                log::warn!(
                    "{}: munmap failed: {}",
                    self.path.display(),
                    io::Error::last_os_error()
                );
            }
        }
    }
}

impl Drop for LinuxFramebuffer {
    fn drop(&mut self) {
        self.unmap();
        if let Err(e) = self.set_cursor_visible(true) {
            log::warn!("{}: failed to show the cursor: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for LinuxFramebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxFramebuffer")
            .field("path", &self.path)
            .field("mapped", &self.mapping.as_ref().map(|m| m.len))
            .field("cursor", &self.cursor)
            .finish()
    }
}
