//! Tests for ModuleRegistry - backend module bookkeeping.

use std::sync::Arc;
use std::thread;

use capcore::error::LookupKind;
use capcore::registry::{ModuleInfo, ModuleRegistry, DEFAULT_PRIORITY};
use capcore::{Capability, CapabilitySet, CoreError};

fn module(id: &str, cap: Capability, priority: i32) -> ModuleInfo {
    ModuleInfo::new(id, cap.into()).with_priority(priority)
}

#[test]
fn test_register_then_is_registered() {
    let registry = ModuleRegistry::new();
    registry.register(module("onnx", Capability::SpeechToText, 100)).unwrap();

    assert!(registry.is_registered("onnx"));
    assert!(!registry.is_registered("llamacpp"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_duplicate_register_keeps_first() {
    let registry = ModuleRegistry::new();
    registry
        .register(module("onnx", Capability::SpeechToText, 100).with_version("1.0"))
        .unwrap();

    let result =
        registry.register(module("onnx", Capability::TextToSpeech, 300).with_version("2.0"));
    assert!(matches!(result, Err(CoreError::AlreadyRegistered(id)) if id == "onnx"));

    let kept = registry.get("onnx").unwrap();
    assert_eq!(kept.version, "1.0");
    assert!(kept.capabilities.contains(Capability::SpeechToText));
    assert!(!kept.capabilities.contains(Capability::TextToSpeech));
}

#[test]
fn test_unregister_absent_is_not_found() {
    let registry = ModuleRegistry::new();
    registry.register(module("onnx", Capability::SpeechToText, 100)).unwrap();

    let result = registry.unregister("whisper");
    assert!(matches!(
        result,
        Err(CoreError::NotFound { kind: LookupKind::Module, ref id }) if id == "whisper"
    ));
    assert!(registry.is_registered("onnx"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_register_unregister_sequence_net_effect() {
    let registry = ModuleRegistry::new();
    registry.register(module("a", Capability::Embeddings, 100)).unwrap();
    registry.register(module("b", Capability::Embeddings, 100)).unwrap();
    registry.unregister("a").unwrap();
    registry.register(module("a", Capability::Embeddings, 100)).unwrap();
    registry.unregister("b").unwrap();

    assert!(registry.is_registered("a"));
    assert!(!registry.is_registered("b"));
    let ids: Vec<_> = registry.list().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["a"]);
}

#[test]
fn test_modules_for_capability_orders_by_priority() {
    let registry = ModuleRegistry::new();
    registry.register(module("alpha", Capability::TextGeneration, 100)).unwrap();
    registry.register(module("beta", Capability::TextGeneration, 200)).unwrap();

    assert_eq!(
        registry.modules_for_capability(Capability::TextGeneration),
        vec!["beta", "alpha"]
    );
}

#[test]
fn test_modules_for_capability_stable_on_ties() {
    let registry = ModuleRegistry::new();
    for id in ["first", "second", "third"] {
        registry.register(module(id, Capability::SpeechToText, 50)).unwrap();
    }
    registry.register(module("top", Capability::SpeechToText, 90)).unwrap();
    registry.register(module("other", Capability::TextToSpeech, 500)).unwrap();

    assert_eq!(
        registry.modules_for_capability(Capability::SpeechToText),
        vec!["top", "first", "second", "third"]
    );
}

#[test]
fn test_multi_capability_module_listed_under_each() {
    let registry = ModuleRegistry::new();
    let speech = [
        Capability::SpeechToText,
        Capability::TextToSpeech,
        Capability::VoiceActivityDetection,
    ];
    let caps: CapabilitySet = speech.into_iter().collect();
    registry.register(ModuleInfo::new("onnx", caps).with_name("ONNX Runtime")).unwrap();

    for cap in speech {
        assert_eq!(registry.modules_for_capability(cap), vec!["onnx"]);
    }
    assert!(registry.modules_for_capability(Capability::TextGeneration).is_empty());
}

#[test]
fn test_default_priority() {
    let info = ModuleInfo::new("m", CapabilitySet::empty());
    assert_eq!(info.priority, DEFAULT_PRIORITY);
    assert_eq!(DEFAULT_PRIORITY, 100);
}

#[test]
fn test_empty_id_rejected() {
    let registry = ModuleRegistry::new();
    let result = registry.register(module("", Capability::Embeddings, 100));
    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    assert!(registry.is_empty());
}

#[test]
fn test_list_is_a_snapshot() {
    let registry = ModuleRegistry::new();
    registry.register(module("a", Capability::Embeddings, 100)).unwrap();
    let snapshot = registry.list();
    registry.unregister("a").unwrap();

    assert_eq!(snapshot.len(), 1);
    assert!(registry.list().is_empty());
}

#[test]
fn test_reset_clears_everything() {
    let registry = ModuleRegistry::new();
    registry.register(module("a", Capability::Embeddings, 100)).unwrap();
    registry.register(module("b", Capability::TextGeneration, 100)).unwrap();
    registry.reset();

    assert!(registry.is_empty());
    registry.register(module("a", Capability::Embeddings, 100)).unwrap();
}

#[test]
fn test_concurrent_registration_of_same_id() {
    let registry = Arc::new(ModuleRegistry::new());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .register(module("shared", Capability::Embeddings, 100))
                    .is_ok()
            })
        })
        .collect();

    let successes = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
    assert_eq!(successes, 1);
    assert_eq!(registry.len(), 1);
}
