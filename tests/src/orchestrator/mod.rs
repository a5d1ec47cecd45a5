mod failures;
mod idempotence;
mod remediation;
mod settings;

use rigup_provision::platform::Arch;

use crate::utils::{FakeFetcher, elf_binary, zip_bytes};

pub(crate) const BUNDLE_URL: &str = "https://dl.example.com/studio.zip";
pub(crate) const RUNTIME_URL: &str = "https://dl.example.com/jdk-arm64.zip";
pub(crate) const SAMPLES_URL: &str = "https://dl.example.com/samples.zip";
pub(crate) const LANG_URL: &str = "https://dl.example.com/lang.vsix";

/// Full plan: primary archive, arm64 runtime, two caches, one extension,
/// managed settings and environment.
pub(crate) const STUDIO_PLAN: &str = r#"
[install]
name = "studio"

[[artifacts]]
name = "bundle"
url = "https://dl.example.com/studio.zip"
expected_min_bytes = 64

[[artifacts]]
name = "jdk-arm64"
url = "https://dl.example.com/jdk-arm64.zip"

[[artifacts]]
name = "samples"
url = "https://dl.example.com/samples.zip"

[[artifacts]]
name = "lang"
url = "https://dl.example.com/lang.vsix"
optional = true

[primary]
artifact = "bundle"
exclude = ["plugins/ndk/"]
subtrees = [{ path = "bin" }, { path = "lib" }, { path = "docs", required = false }]

[secondary_runtime]
name = "runtime"
artifact = "jdk-arm64"
arch = "arm64"
replaces = "jbr/"
install_dir = "jbr"
probe = "bin/java"

[[caches]]
name = "offline-repo"
dest = "${root}/m2"
marker = "repository/index.txt"
source = { bundled = "offline/m2" }

[[caches]]
name = "samples"
dest = "${root}/samples"
marker = "README.md"
source = { artifact = "samples" }
strip_root = true

[[components]]
name = "ide"
path = "bin/studio"

[[components]]
name = "launcher"
path = "bin/studio.sh"
binary = false

[[extensions]]
id = "vendor.lang"
artifact = "lang"

[settings]
path = "${root}/settings.json"
values = { "java.home" = "${component.runtime}", "editor.tabSize" = 4 }

[environment]
profile = "${root}/profile.sh"
vars = { STUDIO_HOME = "${install_root}" }
path_entries = ["${install_root}/bin"]
"#;

pub(crate) fn bundle_zip() -> Vec<u8> {
    let studio = elf_binary(Arch::X64);
    let bundled_java = elf_binary(Arch::X64);
    zip_bytes(&[
        ("bin/studio", &studio),
        ("bin/studio.sh", b"#!/bin/sh\nexec studio \"$@\"\n"),
        ("lib/core.jar", b"core"),
        ("jbr/bin/java", &bundled_java),
        ("plugins/ndk/toolchain.txt", b"ndk"),
        ("plugins/git/plugin.jar", b"git"),
        ("offline/m2/repository/index.txt", b"index"),
    ])
}

/// The bundle without its `lib/` subtree.
pub(crate) fn bundle_zip_without_lib() -> Vec<u8> {
    let studio = elf_binary(Arch::X64);
    zip_bytes(&[
        ("bin/studio", &studio),
        ("bin/studio.sh", b"#!/bin/sh\n"),
        ("offline/m2/repository/index.txt", b"index"),
    ])
}

pub(crate) fn runtime_zip() -> Vec<u8> {
    let java = elf_binary(Arch::Arm64);
    zip_bytes(&[
        ("jdk-17.0.9/bin/java", &java),
        ("jdk-17.0.9/lib/modules", b"modules"),
    ])
}

pub(crate) fn samples_zip() -> Vec<u8> {
    zip_bytes(&[
        ("samples-main/README.md", b"# Samples"),
        ("samples-main/hello/Main.kt", b"fun main() {}"),
    ])
}

pub(crate) fn lang_vsix() -> Vec<u8> {
    zip_bytes(&[
        ("[Content_Types].xml", b"<Types/>"),
        ("extension/package.json", b"{\"name\": \"lang\"}"),
        ("extension/out/main.js", b"exports.activate = () => {};"),
    ])
}

/// A fetcher serving every artifact of [`STUDIO_PLAN`].
pub(crate) fn studio_fetcher() -> FakeFetcher {
    FakeFetcher::new()
        .serve(BUNDLE_URL, bundle_zip())
        .serve(RUNTIME_URL, runtime_zip())
        .serve(SAMPLES_URL, samples_zip())
        .serve(LANG_URL, lang_vsix())
}
