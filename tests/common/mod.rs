use std::path::{Path, PathBuf};

use firmador_core::keys::KeyMaterial;

pub const PASSPHRASE: &str = "sri-test";

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/containers")
        .join(name)
}

#[allow(dead_code)]
pub fn container_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).expect("read container fixture")
}

#[allow(dead_code)]
pub fn signing_material() -> KeyMaterial {
    KeyMaterial::from_pkcs12(&container_bytes("signing.p12"), PASSPHRASE)
        .expect("extract signing.p12")
}

#[allow(dead_code)]
pub fn expected_certificate_der() -> Vec<u8> {
    std::fs::read(fixture_path("signing-cert.der")).expect("read certificate fixture")
}
