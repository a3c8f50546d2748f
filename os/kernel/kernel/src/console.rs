/// Byte sink behind the `write` system call.
pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);
}

impl<C: Console + ?Sized> Console for &mut C {
    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }
}

/// Writes to the QEMU debug console.
#[derive(Debug, Copy, Clone, Default)]
pub struct QemuConsole;

impl Console for QemuConsole {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) {
        kernel_qemu::qemu_fmt::write_bytes(bytes);
    }
}
