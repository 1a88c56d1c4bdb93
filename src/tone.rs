//! Write-only handle to the pcspkr evdev node. A tone is one
//! `input_event` record with type `EV_SND`, code `SND_TONE` and the
//! frequency in Hz as the value; frequency 0 stops the sound.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::slice;

use crate::dispatch::ToneSink;

// from linux/input-event-codes.h
const EV_SND: u16 = 0x12;
const SND_TONE: u16 = 0x02;

const NAME_BUF_LEN: usize = 128;

// _IOC(_IOC_READ, 'E', nr, size)
const fn eviocg(nr: libc::c_ulong, size: libc::c_ulong) -> libc::c_ulong {
	(2 << 30) | (size << 16) | (0x45 << 8) | nr
}

const EVIOCGNAME: libc::c_ulong = eviocg(0x06, NAME_BUF_LEN as libc::c_ulong);
const EVIOCGID: libc::c_ulong = eviocg(0x02, mem::size_of::<libc::input_id>() as libc::c_ulong);

/// What the kernel reports about the opened device, for operator display.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
	pub name: String,
	pub bustype: u16,
	pub vendor: u16,
	pub product: u16,
	pub version: u16,
}

#[derive(Debug)]
pub enum ToneError {
	/// The device path could not be opened. The caller may keep running
	/// without audio.
	Open(io::Error),
	/// The path opened but does not answer the evdev identity ioctls,
	/// so it is not a usable tone device.
	Identity(io::Error),
}

impl fmt::Display for ToneError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ToneError::Open(e) => write!(f, "cannot open tone device: {}", e),
			ToneError::Identity(e) => write!(f, "cannot read tone device identity: {}", e),
		}
	}
}

impl std::error::Error for ToneError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ToneError::Open(e) | ToneError::Identity(e) => Some(e),
		}
	}
}

pub struct ToneDevice {
	file: std::fs::File,
	identity: DeviceIdentity,
}

impl ToneDevice {
	/// Open the device write-only and read back its identity. The fd is
	/// closed again when the handle is dropped.
	pub fn open(path: &str) -> Result<ToneDevice, ToneError> {
		let file = OpenOptions::new()
			.write(true)
			.open(path)
			.map_err(ToneError::Open)?;
		let identity = read_identity(file.as_raw_fd()).map_err(ToneError::Identity)?;
		Ok(ToneDevice { file, identity })
	}

	pub fn identity(&self) -> &DeviceIdentity {
		&self.identity
	}

	/// Start a tone at `hz`, or stop the current one if `hz` is 0.
	pub fn emit(&mut self, hz: i32) -> io::Result<()> {
		let ev = libc::input_event {
			time: libc::timeval {
				tv_sec: 0,
				tv_usec: 0,
			},
			type_: EV_SND,
			code: SND_TONE,
			value: hz,
		};
		let bytes = unsafe {
			slice::from_raw_parts(
				&ev as *const libc::input_event as *const u8,
				mem::size_of::<libc::input_event>(),
			)
		};
		self.file.write_all(bytes)
	}
}

impl ToneSink for ToneDevice {
	fn emit(&mut self, hz: i32) -> io::Result<()> {
		ToneDevice::emit(self, hz)
	}
}

fn read_identity(fd: RawFd) -> io::Result<DeviceIdentity> {
	let mut name = [0u8; NAME_BUF_LEN];
	if unsafe { libc::ioctl(fd, EVIOCGNAME, name.as_mut_ptr()) } < 0 {
		return Err(io::Error::last_os_error());
	}
	let mut id: libc::input_id = unsafe { mem::zeroed() };
	if unsafe { libc::ioctl(fd, EVIOCGID, &mut id) } < 0 {
		return Err(io::Error::last_os_error());
	}
	let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
	Ok(DeviceIdentity {
		name: String::from_utf8_lossy(&name[..end]).into_owned(),
		bustype: id.bustype,
		vendor: id.vendor,
		product: id.product,
		version: id.version,
	})
}
