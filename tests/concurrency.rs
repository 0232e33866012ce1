use std::sync::Arc;

use dpop_bind::{
    DpopKey, DpopPolicy, MemoryReplayCache, ProofVerifier, RejectReason, create_proof,
};

const URL: &str = "https://api.example.com/api/resource";
const TOKEN: &str = "access-token";
const N: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn one_proof_verified_concurrently_is_accepted_exactly_once() {
    let policy = DpopPolicy::default();
    let verifier = Arc::new(ProofVerifier::new(
        policy,
        Arc::new(MemoryReplayCache::from_policy(&policy)),
    )
    .expect("verifier"));
    let key = DpopKey::generate().expect("keygen");
    let proof = Arc::new(create_proof("GET", URL, TOKEN, &key).expect("proof").into_string());

    let barrier = Arc::new(tokio::sync::Barrier::new(N));
    let handles: Vec<_> = (0..N)
        .map(|_| {
            let verifier = verifier.clone();
            let proof = proof.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                verifier.verify(&proof, "GET", URL, TOKEN).await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut replayed = 0;
    for handle in handles {
        match handle.await.expect("task") {
            Ok(_) => accepted += 1,
            Err(RejectReason::ReplayDetected) => replayed += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(replayed, N - 1);
}

#[test]
fn raw_cache_admits_each_jti_once_across_threads() {
    let cache = Arc::new(MemoryReplayCache::default());
    let now = 1_700_000_000;

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                (0..20)
                    .filter(|i| !cache.seen_and_record_at(&format!("jti-{i}"), now))
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .sum();
    assert_eq!(admitted, 20);
    assert_eq!(cache.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_proofs_verify_in_parallel() {
    let policy = DpopPolicy::default();
    let verifier = Arc::new(ProofVerifier::new(
        policy,
        Arc::new(MemoryReplayCache::from_policy(&policy)),
    )
    .expect("verifier"));
    let key = Arc::new(DpopKey::generate().expect("keygen"));

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let verifier = verifier.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let proof = create_proof("GET", URL, TOKEN, &key).expect("proof");
                verifier.verify(proof.as_str(), "GET", URL, TOKEN).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.expect("task").is_ok());
    }
}
