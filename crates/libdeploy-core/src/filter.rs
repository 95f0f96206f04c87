//! Deployable-vs-system classification of dependency names.
//!
//! Each platform has an allow list of library-name patterns (runtime and
//! sanitizer shapes) and a deny set of libraries every host already ships.
//! A name in the deny set is excluded even when a pattern matches it.

use crate::types::{Classification, Platform};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Platform tables
// ---------------------------------------------------------------------------

const WINDOWS_RUNTIME_PATTERNS: &[&str] = &[
    r"libwinpthread.*\.dll",
    r"libgcc_s_.*\.dll",
    r"libstdc\+\+.*\.dll",
    r"libc\+\+.*\.dll",
    r"libunwind.*\.dll",
    r"libgomp.*\.dll",
    r"libssp.*\.dll",
    r"libquadmath.*\.dll",
];

const WINDOWS_SANITIZER_PATTERNS: &[&str] = &[
    r"libclang_rt\.asan_dynamic.*\.dll",
    r"libclang_rt\.ubsan_dynamic.*\.dll",
    r"libclang_rt\.tsan_dynamic.*\.dll",
    r"libclang_rt\.msan_dynamic.*\.dll",
];

const WINDOWS_SYSTEM_LIBRARIES: &[&str] = &[
    "kernel32.dll",
    "ntdll.dll",
    "msvcrt.dll",
    "ucrtbase.dll",
    "user32.dll",
    "advapi32.dll",
    "ws2_32.dll",
    "shell32.dll",
    "ole32.dll",
    "oleaut32.dll",
    "gdi32.dll",
    "comdlg32.dll",
    "comctl32.dll",
    "bcrypt.dll",
    "crypt32.dll",
];

const LINUX_RUNTIME_PATTERNS: &[&str] = &[
    r"libc\+\+\.so(\.\d+)*",
    r"libc\+\+abi\.so(\.\d+)*",
    r"libunwind\.so(\.\d+)*",
];

const LINUX_SANITIZER_PATTERNS: &[&str] = &[r"libclang_rt\..+\.so"];

const LINUX_SYSTEM_LIBRARIES: &[&str] = &[
    "libc.so.6",
    "libm.so.6",
    "libpthread.so.0",
    "libdl.so.2",
    "librt.so.1",
    "linux-vdso.so.1",
    "ld-linux-x86-64.so.2",
    "ld-linux-aarch64.so.1",
    "libgcc_s.so.1",
];

const MACOS_RUNTIME_PATTERNS: &[&str] = &[
    r"libc\+\+\.\d+\.dylib",
    r"libc\+\+abi\.\d+\.dylib",
    r"libunwind\.\d+\.dylib",
];

const MACOS_SANITIZER_PATTERNS: &[&str] = &[r"libclang_rt\..+\.dylib"];

const MACOS_SYSTEM_LIBRARIES: &[&str] = &["libsystem.b.dylib", "libobjc.a.dylib"];

/// Install-name prefixes that always point at OS-provided images.
const MACOS_SYSTEM_PREFIXES: &[&str] = &["/usr/lib/", "/system/library/"];

// ---------------------------------------------------------------------------
// DependencyFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AllowPattern {
    regex: Regex,
    class: Classification,
}

#[derive(Debug, Clone)]
pub struct DependencyFilter {
    allow: Vec<AllowPattern>,
    deny: HashSet<String>,
    deny_prefixes: Vec<String>,
}

impl DependencyFilter {
    /// Build a filter from raw tables. Patterns must match the whole file name
    /// and are compiled case-insensitively; deny entries are compared lower-cased.
    pub fn new(
        runtime: &[&str],
        sanitizer: &[&str],
        deny: &[&str],
        deny_prefixes: &[&str],
    ) -> Result<Self, regex::Error> {
        let mut allow = Vec::with_capacity(runtime.len() + sanitizer.len());
        for (patterns, class) in [
            (runtime, Classification::DeployableRuntime),
            (sanitizer, Classification::DeployableSanitizer),
        ] {
            for pattern in patterns {
                allow.push(AllowPattern {
                    regex: Regex::new(&format!("(?i)^(?:{pattern})$"))?,
                    class,
                });
            }
        }
        Ok(Self {
            allow,
            deny: deny.iter().map(|d| d.to_ascii_lowercase()).collect(),
            deny_prefixes: deny_prefixes
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        })
    }

    /// The built-in filter for `platform`.
    pub fn for_platform(platform: Platform) -> &'static DependencyFilter {
        static WINDOWS: OnceLock<DependencyFilter> = OnceLock::new();
        static LINUX: OnceLock<DependencyFilter> = OnceLock::new();
        static MACOS: OnceLock<DependencyFilter> = OnceLock::new();

        match platform {
            Platform::Windows => WINDOWS.get_or_init(|| {
                DependencyFilter::new(
                    WINDOWS_RUNTIME_PATTERNS,
                    WINDOWS_SANITIZER_PATTERNS,
                    WINDOWS_SYSTEM_LIBRARIES,
                    &[],
                )
                .unwrap()
            }),
            Platform::Linux => LINUX.get_or_init(|| {
                DependencyFilter::new(
                    LINUX_RUNTIME_PATTERNS,
                    LINUX_SANITIZER_PATTERNS,
                    LINUX_SYSTEM_LIBRARIES,
                    &[],
                )
                .unwrap()
            }),
            Platform::MacOs => MACOS.get_or_init(|| {
                DependencyFilter::new(
                    MACOS_RUNTIME_PATTERNS,
                    MACOS_SANITIZER_PATTERNS,
                    MACOS_SYSTEM_LIBRARIES,
                    MACOS_SYSTEM_PREFIXES,
                )
                .unwrap()
            }),
        }
    }

    pub fn classify(&self, name: &str) -> Classification {
        let lowered = name.trim().to_ascii_lowercase();
        if self.is_denied(&lowered) {
            return Classification::ExcludedSystem;
        }
        let file_name = file_component(&lowered);
        self.allow
            .iter()
            .find(|p| p.regex.is_match(file_name))
            .map(|p| p.class)
            .unwrap_or(Classification::ExcludedSystem)
    }

    pub fn is_deployable(&self, name: &str) -> bool {
        self.classify(name).is_deployable()
    }

    fn is_denied(&self, lowered: &str) -> bool {
        self.deny.contains(lowered)
            || self.deny.contains(file_component(lowered))
            || self.deny_prefixes.iter().any(|p| lowered.starts_with(p))
    }
}

/// Last path component of an install name or plain file name.
pub(crate) fn file_component(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_runtime_and_sanitizer_dlls() {
        let filter = DependencyFilter::for_platform(Platform::Windows);
        assert_eq!(
            filter.classify("libwinpthread-1.dll"),
            Classification::DeployableRuntime
        );
        assert_eq!(
            filter.classify("LIBGCC_S_SEH-1.DLL"),
            Classification::DeployableRuntime
        );
        assert_eq!(
            filter.classify("libstdc++-6.dll"),
            Classification::DeployableRuntime
        );
        assert_eq!(
            filter.classify("libclang_rt.asan_dynamic-x86_64.dll"),
            Classification::DeployableSanitizer
        );
        assert_eq!(
            filter.classify("KERNEL32.dll"),
            Classification::ExcludedSystem
        );
        assert_eq!(filter.classify("mylib.dll"), Classification::ExcludedSystem);
    }

    #[test]
    fn linux_versioned_names() {
        let filter = DependencyFilter::for_platform(Platform::Linux);
        assert!(filter.is_deployable("libc++.so.1"));
        assert!(filter.is_deployable("libc++.so.1.0"));
        assert!(filter.is_deployable("libc++abi.so.1"));
        assert!(filter.is_deployable("libunwind.so"));
        assert_eq!(
            filter.classify("libclang_rt.asan-x86_64.so"),
            Classification::DeployableSanitizer
        );
        assert!(!filter.is_deployable("libc.so.6"));
        assert!(!filter.is_deployable("libgcc_s.so.1"));
        assert!(!filter.is_deployable("libz.so.1"));
    }

    #[test]
    fn macos_install_names() {
        let filter = DependencyFilter::for_platform(Platform::MacOs);
        assert!(filter.is_deployable("@rpath/libc++.1.dylib"));
        assert!(filter.is_deployable("@rpath/libunwind.1.dylib"));
        assert_eq!(
            filter.classify("@rpath/libclang_rt.asan_osx_dynamic.dylib"),
            Classification::DeployableSanitizer
        );
        assert!(!filter.is_deployable("/usr/lib/libSystem.B.dylib"));
        assert!(!filter.is_deployable(
            "/System/Library/Frameworks/CoreFoundation.framework/CoreFoundation"
        ));
    }

    #[test]
    fn deny_wins_over_allow() {
        // /usr/lib/libc++.1.dylib matches the runtime pattern by file name
        // but lives under a system prefix.
        let filter = DependencyFilter::for_platform(Platform::MacOs);
        assert_eq!(
            filter.classify("/usr/lib/libc++.1.dylib"),
            Classification::ExcludedSystem
        );

        let custom =
            DependencyFilter::new(&[r"libfoo.*\.so(\.\d+)*"], &[], &["libfoo.so.2"], &[]).unwrap();
        assert!(custom.is_deployable("libfoo.so.1"));
        assert_eq!(custom.classify("LIBFOO.so.2"), Classification::ExcludedSystem);
    }

    #[test]
    fn patterns_match_whole_name() {
        let filter = DependencyFilter::for_platform(Platform::Linux);
        assert!(!filter.is_deployable("libc++.so.1.bak"));
        assert!(!filter.is_deployable("notlibc++.so.1"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(DependencyFilter::new(&["lib(foo"], &[], &[], &[]).is_err());
    }
}
