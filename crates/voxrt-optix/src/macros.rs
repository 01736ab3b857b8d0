/// Declares opaque, copyable handle types for device-side objects.
/// Backends mint them with `from_raw`; everyone else only passes them around.
macro_rules! device_handles {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl $name {
                pub fn from_raw(raw: u32) -> Self {
                    $name(raw)
                }

                pub fn raw(self) -> u32 {
                    self.0
                }
            }
        )+
    };
}

pub(crate) use device_handles;
