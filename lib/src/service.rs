//! Service table plumbing.
//!
//! Crates lower in the dependency graph declare a table of function pointers
//! with [`define_service!`]; whoever sits at the top of the graph (boot)
//! fills it in once with concrete implementations. This keeps dependencies
//! one-way: `core` never links against `drivers`, it calls through the table.

/// Declare a service table.
///
/// ```ignore
/// vexos_lib::define_service! {
///     platform => PlatformServices {
///         irq_send_eoi(irq: u8);
///         @no_wrapper irq_mask_line(irq: u8) -> i32;
///     }
/// }
/// ```
///
/// Generates the `PlatformServices` struct, `register_platform_services()`,
/// `platform_services()`, `platform_services_registered()`, and an inline
/// module-level wrapper per method. `@no_wrapper` suppresses the wrapper so
/// the declaring module can write its own.
#[macro_export]
macro_rules! define_service {
    (
        $(#[$meta:meta])*
        $prefix:ident => $name:ident {
            $(
                $(@$flag:ident)? $method:ident ( $($arg:ident : $argty:ty),* $(,)? ) $(-> $ret:ty)? ;
            )*
        }
    ) => {
        $crate::paste::paste! {
            $(#[$meta])*
            pub struct $name {
                $(
                    pub $method: fn($($argty),*) $(-> $ret)?,
                )*
            }

            // SAFETY: the table holds only plain function pointers.
            unsafe impl Sync for $name {}

            static [<$prefix:upper _SERVICES_PTR>]: ::core::sync::atomic::AtomicPtr<$name> =
                ::core::sync::atomic::AtomicPtr::new(::core::ptr::null_mut());

            /// Install the service implementations. Called once during boot,
            /// before anything dispatches through the table.
            pub fn [<register_ $prefix _services>](services: &'static $name) {
                [<$prefix:upper _SERVICES_PTR>].store(
                    services as *const $name as *mut $name,
                    ::core::sync::atomic::Ordering::Release,
                );
            }

            pub fn [<$prefix _services_registered>]() -> bool {
                ![<$prefix:upper _SERVICES_PTR>]
                    .load(::core::sync::atomic::Ordering::Acquire)
                    .is_null()
            }

            /// # Panics
            ///
            /// Panics if the table has not been registered yet.
            pub fn [<$prefix _services>]() -> &'static $name {
                let ptr = [<$prefix:upper _SERVICES_PTR>]
                    .load(::core::sync::atomic::Ordering::Acquire);
                if ptr.is_null() {
                    panic!(concat!(stringify!($prefix), " services not registered"));
                }
                // SAFETY: only `register_*_services` stores here, and it
                // stores a &'static reference.
                unsafe { &*ptr }
            }

            $(
                $crate::__define_service_wrapper! {
                    $($flag)? ; $prefix ; $method ; ( $($arg : $argty),* ) ; ( $($ret)? )
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __define_service_wrapper {
    (no_wrapper ; $prefix:ident ; $method:ident ; ( $($arg:ident : $argty:ty),* ) ; ( $($ret:ty)? )) => {};
    ( ; $prefix:ident ; $method:ident ; ( $($arg:ident : $argty:ty),* ) ; ( $($ret:ty)? )) => {
        $crate::paste::paste! {
            #[inline(always)]
            pub fn $method($($arg: $argty),*) $(-> $ret)? {
                ([<$prefix _services>]().$method)($($arg),*)
            }
        }
    };
}
