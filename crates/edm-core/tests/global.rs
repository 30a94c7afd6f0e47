//! The process-wide registry can be installed exactly once.

mod common;

use edm_core::Registry;

#[test]
fn test_install_global_once() {
    assert!(Registry::global().is_none());

    let installed = common::registry().install_global().unwrap();
    assert!(installed.buffers().contains("HitCollection"));
    assert_eq!(installed.datamodels().index_of("demo"), Some(0));

    let rejected = Registry::new().install_global().unwrap_err();
    assert!(rejected.datamodels().is_empty());

    let global = Registry::global().unwrap();
    assert!(std::ptr::eq(global, installed));
}
