use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::capability::Capabilities;
use crate::control::{Description, Flags};
use crate::error::{Error, Result};
use crate::v4l2;
use crate::v4l2::videodev::*;
use crate::v4l2::vidioc;

/// Low-level control transport: one blocking driver call per operation.
///
/// Implemented by the fd-backed device handle; kept as a trait so the
/// enumeration and apply semantics can be exercised without hardware.
pub(crate) trait ControlOps {
    /// Query a control's metadata (bounds, default, name, flags).
    fn query(&self, id: u32) -> io::Result<v4l2_queryctrl>;

    /// Read a control's current value.
    fn get(&self, id: u32) -> io::Result<i32>;

    /// Write a control value. Out-of-range values are rejected by the driver.
    fn set(&self, id: u32, value: i32) -> io::Result<()>;
}

/// Owned device file descriptor, closed on drop.
struct Handle {
    fd: std::os::raw::c_int,
}

impl Handle {
    fn open(path: &Path) -> io::Result<Self> {
        let fd = v4l2::open(path, libc::O_RDWR)?;
        Ok(Handle { fd })
    }

    fn query_caps(&self) -> io::Result<Capabilities> {
        unsafe {
            let mut caps: v4l2_capability = mem::zeroed();
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_QUERYCAP,
                &mut caps as *mut _ as *mut std::os::raw::c_void,
            )?;
            Ok(Capabilities::from(caps))
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = v4l2::close(self.fd);
    }
}

impl ControlOps for Handle {
    fn query(&self, id: u32) -> io::Result<v4l2_queryctrl> {
        unsafe {
            let mut ctrl: v4l2_queryctrl = mem::zeroed();
            ctrl.id = id;
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_QUERYCTRL,
                &mut ctrl as *mut _ as *mut std::os::raw::c_void,
            )?;
            Ok(ctrl)
        }
    }

    fn get(&self, id: u32) -> io::Result<i32> {
        unsafe {
            let mut ctrl = v4l2_control {
                id,
                ..mem::zeroed()
            };
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_G_CTRL,
                &mut ctrl as *mut _ as *mut std::os::raw::c_void,
            )?;
            Ok(ctrl.value)
        }
    }

    fn set(&self, id: u32, value: i32) -> io::Result<()> {
        unsafe {
            let mut ctrl = v4l2_control { id, value };
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_S_CTRL,
                &mut ctrl as *mut _ as *mut std::os::raw::c_void,
            )
        }
    }
}

/// Per-control outcome of [`ControlCatalog::apply`].
///
/// Application is best-effort: a rejected control never aborts the remaining
/// writes and nothing is rolled back.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Names of controls written successfully, in write order.
    pub applied: Vec<String>,
    /// Controls the driver rejected, with the individual error.
    pub failed: Vec<(String, Error)>,
}

impl ApplyReport {
    /// Whether every requested control was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Discovers and mutates the integer-valued controls of one video device.
///
/// The catalog owns an open handle to exactly one device node for its
/// lifetime. The handle is acquired by [`ControlCatalog::open`] and released
/// by [`ControlCatalog::close`] or on drop; any control operation after
/// `close` fails with [`Error::UseAfterClose`] without touching the device.
///
/// # Example
///
/// ```
/// use uvccam::ControlCatalog;
///
/// if let Ok(catalog) = ControlCatalog::open("/dev/video0") {
///     for (name, ctrl) in catalog.enumerate().unwrap() {
///         println!("{}: {}", name, ctrl.current_value);
///     }
/// }
/// ```
pub struct ControlCatalog {
    path: PathBuf,
    capabilities: Capabilities,
    handle: Option<Handle>,
}

impl ControlCatalog {
    /// Opens the device node for read/write and verifies it speaks V4L2.
    ///
    /// # Arguments
    ///
    /// * `path` - Node path (usually a character device, e.g. /dev/video0)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let handle = Handle::open(&path).map_err(|source| Error::DeviceOpen {
            path: path.clone(),
            source,
        })?;

        // A node that opens but rejects QUERYCAP is not a V4L2 device.
        let capabilities = handle.query_caps().map_err(|source| Error::DeviceOpen {
            path: path.clone(),
            source,
        })?;

        Ok(ControlCatalog {
            path,
            capabilities,
            handle: Some(handle),
        })
    }

    /// Returns the path of the device node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the device identity queried at open time.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn handle(&self) -> Result<&Handle> {
        self.handle.as_ref().ok_or(Error::UseAfterClose)
    }

    /// Reads the current value of a single control.
    pub fn read_control(&self, id: u32) -> Result<i32> {
        self.handle()?
            .get(id)
            .map_err(|source| Error::ControlIo { id, source })
    }

    /// Writes a control value.
    ///
    /// No range validation is performed here; out-of-range values are
    /// rejected by the driver and surfaced as [`Error::ControlIo`].
    pub fn write_control(&self, id: u32, value: i32) -> Result<()> {
        self.handle()?
            .set(id, value)
            .map_err(|source| Error::ControlIo { id, source })
    }

    /// Discovers the device's controls with bounds, defaults and current
    /// values, keyed by control name.
    ///
    /// Should the device expose several controls under the same name, the
    /// one discovered last wins.
    pub fn enumerate(&self) -> Result<BTreeMap<String, Description>> {
        Ok(enumerate_controls(self.handle()?))
    }

    /// Writes `current_value` to each control in `settings`, one blocking
    /// call per entry, continuing past individual failures.
    pub fn apply(&self, settings: &BTreeMap<String, Description>) -> Result<ApplyReport> {
        Ok(apply_controls(self.handle()?, settings))
    }

    /// Releases the device handle. Further control operations fail with
    /// [`Error::UseAfterClose`]. Calling `close` again is a no-op.
    pub fn close(&mut self) {
        self.handle = None;
    }
}

fn enumerate_controls(ops: &impl ControlOps) -> BTreeMap<String, Description> {
    let mut controls = BTreeMap::new();

    // Standard ids are sparse: probe every id up to the fixed ceiling, a
    // failed query only means that id is not implemented by the driver.
    for id in V4L2_CID_BASE..V4L2_CID_LASTP1 {
        if let Ok(ctrl) = ops.query(id) {
            insert_control(ops, &mut controls, &ctrl);
        }
    }

    // Driver-private ids are dense but unbounded: walk upwards until the
    // first query failure, which marks the end of the block.
    let mut id = V4L2_CID_PRIVATE_BASE;
    while let Ok(ctrl) = ops.query(id) {
        insert_control(ops, &mut controls, &ctrl);
        id += 1;
    }

    controls
}

fn insert_control(
    ops: &impl ControlOps,
    controls: &mut BTreeMap<String, Description>,
    ctrl: &v4l2_queryctrl,
) {
    if Flags::from(ctrl.flags).contains(Flags::DISABLED) {
        return;
    }

    match ops.get(ctrl.id) {
        Ok(current_value) => {
            let desc = Description::from_query(ctrl, current_value);
            controls.insert(desc.name.clone(), desc);
        }
        Err(err) => {
            debug!(id = ctrl.id, "skipping control, value read failed: {}", err);
        }
    }
}

fn apply_controls(
    ops: &impl ControlOps,
    settings: &BTreeMap<String, Description>,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for (name, ctrl) in settings {
        match ops.set(ctrl.id, ctrl.current_value) {
            Ok(()) => report.applied.push(name.clone()),
            Err(source) => {
                warn!(
                    name = %name,
                    id = ctrl.id,
                    value = ctrl.current_value,
                    "failed to set control: {}", source
                );
                report.failed.push((
                    name.clone(),
                    Error::ControlIo {
                        id: ctrl.id,
                        source,
                    },
                ));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    struct FakeControl {
        name: &'static str,
        minimum: i32,
        maximum: i32,
        disabled: bool,
    }

    /// In-memory device: a set of implemented ids with values, plus a log of
    /// every queried id.
    #[derive(Default)]
    struct FakeDevice {
        controls: BTreeMap<u32, FakeControl>,
        values: RefCell<BTreeMap<u32, i32>>,
        queried: RefCell<Vec<u32>>,
    }

    impl FakeDevice {
        fn add(&mut self, id: u32, name: &'static str, value: i32) {
            self.controls.insert(
                id,
                FakeControl {
                    name,
                    minimum: 0,
                    maximum: 255,
                    disabled: false,
                },
            );
            self.values.borrow_mut().insert(id, value);
        }

        fn add_disabled(&mut self, id: u32, name: &'static str) {
            self.controls.insert(
                id,
                FakeControl {
                    name,
                    minimum: 0,
                    maximum: 255,
                    disabled: true,
                },
            );
        }
    }

    impl ControlOps for FakeDevice {
        fn query(&self, id: u32) -> io::Result<v4l2_queryctrl> {
            self.queried.borrow_mut().push(id);
            let ctrl = self
                .controls
                .get(&id)
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;

            let mut name = [0u8; 32];
            name[..ctrl.name.len()].copy_from_slice(ctrl.name.as_bytes());
            Ok(v4l2_queryctrl {
                id,
                type_: 1,
                name,
                minimum: ctrl.minimum,
                maximum: ctrl.maximum,
                step: 1,
                default_value: ctrl.minimum,
                flags: if ctrl.disabled { 0x0001 } else { 0 },
                reserved: [0; 2],
            })
        }

        fn get(&self, id: u32) -> io::Result<i32> {
            self.values
                .borrow()
                .get(&id)
                .copied()
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
        }

        fn set(&self, id: u32, value: i32) -> io::Result<()> {
            let mut values = self.values.borrow_mut();
            match values.get_mut(&id) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
            }
        }
    }

    fn closed_catalog() -> ControlCatalog {
        ControlCatalog {
            path: PathBuf::from("/dev/video0"),
            capabilities: Capabilities {
                driver: "uvcvideo".to_string(),
                card: "Test Camera".to_string(),
                bus: "usb-0000:00:14.0-1".to_string(),
                version: (6, 1, 0),
            },
            handle: None,
        }
    }

    #[test]
    fn empty_standard_range_yields_extended_entries_only() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_PRIVATE_BASE, "Vendor Knob", 7);
        dev.add(V4L2_CID_PRIVATE_BASE + 1, "Vendor Dial", 9);

        let controls = enumerate_controls(&dev);
        assert_eq!(controls.len(), 2);
        assert_eq!(controls["Vendor Knob"].current_value, 7);
        assert_eq!(controls["Vendor Dial"].id, V4L2_CID_PRIVATE_BASE + 1);
    }

    #[test]
    fn standard_scan_probes_every_id_despite_failures() {
        let dev = FakeDevice::default();
        enumerate_controls(&dev);

        let queried: BTreeSet<u32> = dev.queried.borrow().iter().copied().collect();
        for id in V4L2_CID_BASE..V4L2_CID_LASTP1 {
            assert!(queried.contains(&id), "id {:#x} was never probed", id);
        }
    }

    #[test]
    fn standard_scan_skips_gaps_and_keeps_going() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_BASE, "Brightness", 128);
        // gap at BASE+1..BASE+2
        dev.add(V4L2_CID_BASE + 3, "Hue", 0);

        let controls = enumerate_controls(&dev);
        assert!(controls.contains_key("Brightness"));
        assert!(controls.contains_key("Hue"));
    }

    #[test]
    fn extended_scan_stops_at_first_gap() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_PRIVATE_BASE, "Vendor A", 1);
        dev.add(V4L2_CID_PRIVATE_BASE + 1, "Vendor B", 2);
        // gap at PRIVATE_BASE+2; this control must never be reached
        dev.add(V4L2_CID_PRIVATE_BASE + 3, "Vendor D", 4);

        let controls = enumerate_controls(&dev);
        assert!(controls.contains_key("Vendor A"));
        assert!(controls.contains_key("Vendor B"));
        assert!(!controls.contains_key("Vendor D"));

        let queried = dev.queried.borrow();
        assert!(queried.contains(&(V4L2_CID_PRIVATE_BASE + 2)));
        assert!(!queried.contains(&(V4L2_CID_PRIVATE_BASE + 3)));
    }

    #[test]
    fn disabled_controls_are_not_listed() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_BASE, "Brightness", 128);
        dev.add_disabled(V4L2_CID_BASE + 1, "Contrast");

        let controls = enumerate_controls(&dev);
        assert!(controls.contains_key("Brightness"));
        assert!(!controls.contains_key("Contrast"));
    }

    #[test]
    fn duplicate_names_keep_the_last_discovered_entry() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_BASE, "Gain", 10);
        dev.add(V4L2_CID_BASE + 5, "Gain", 20);

        let controls = enumerate_controls(&dev);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls["Gain"].id, V4L2_CID_BASE + 5);
        assert_eq!(controls["Gain"].current_value, 20);
    }

    #[test]
    fn apply_attempts_every_control_and_reports_failures() {
        let mut dev = FakeDevice::default();
        dev.add(V4L2_CID_BASE, "Brightness", 0);
        dev.add(V4L2_CID_BASE + 1, "Contrast", 0);

        let mut settings = enumerate_controls(&dev);
        settings.get_mut("Brightness").unwrap().current_value = 100;
        settings.get_mut("Contrast").unwrap().current_value = 50;
        // one setting whose id the device does not implement
        settings.insert(
            "Bogus".to_string(),
            Description {
                id: 0xdead_beef,
                name: "Bogus".to_string(),
                minimum: 0,
                maximum: 1,
                step: 1,
                default_value: 0,
                current_value: 1,
            },
        );

        let report = apply_controls(&dev, &settings);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.failed[0].0, "Bogus");

        // the valid writes went through despite the failure
        assert_eq!(dev.values.borrow()[&V4L2_CID_BASE], 100);
        assert_eq!(dev.values.borrow()[&(V4L2_CID_BASE + 1)], 50);
    }

    #[test]
    fn operations_after_close_fail_without_device_io() {
        let mut catalog = closed_catalog();

        assert!(matches!(
            catalog.read_control(V4L2_CID_BASE),
            Err(Error::UseAfterClose)
        ));
        assert!(matches!(
            catalog.write_control(V4L2_CID_BASE, 1),
            Err(Error::UseAfterClose)
        ));
        assert!(matches!(catalog.enumerate(), Err(Error::UseAfterClose)));
        assert!(matches!(
            catalog.apply(&BTreeMap::new()),
            Err(Error::UseAfterClose)
        ));

        // closing again stays a no-op
        catalog.close();
    }
}
