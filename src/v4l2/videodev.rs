//! Hand-carried definitions from linux/videodev2.h and linux/v4l2-controls.h.
//!
//! We carry our own copies of the few kernel structs we touch instead of
//! generating bindings for the whole header. The struct layouts are part of
//! the stable V4L2 userspace ABI and must match the kernel byte for byte.

#![allow(non_camel_case_types)]

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_queryctrl {
    pub id: u32,
    pub type_: u32,
    pub name: [u8; 32],
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
    pub reserved: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_control {
    pub id: u32,
    pub value: i32,
}

/// Control id boundaries, from linux/v4l2-controls.h.
///
/// The standard (user class) block is sparse and bounded by `V4L2_CID_LASTP1`;
/// the driver-private block starting at `V4L2_CID_PRIVATE_BASE` is dense and
/// has no documented upper bound.
pub const V4L2_CTRL_CLASS_USER: u32 = 0x0098_0000;
pub const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
pub const V4L2_CID_LASTP1: u32 = V4L2_CID_BASE + 44;
pub const V4L2_CID_PRIVATE_BASE: u32 = 0x0800_0000;

/// Decodes a fixed-size, nul-padded kernel string field.
pub(crate) fn fixed_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
