//! Concurrent intake against the memory store.
//!
//! Many coroutines file complaints at once; every one must get a distinct code and the
//! codes must form an unbroken run after the year's existing maximum.

use adumuo::store::MemoryStore;
use adumuo::{
    AccessGate, Complaint, ComplaintService, ComplaintStore, ManualClock, Principal,
    ReferenceCode, Status, Unauthorized,
};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

struct NoStaff;

impl AccessGate for NoStaff {
    fn authenticate(&self, _token: &str) -> Result<Principal, Unauthorized> {
        Err(Unauthorized)
    }
}

fn legacy(id: i64, code: &str) -> Complaint {
    Complaint {
        id,
        reference_code: ReferenceCode::from_stored(code.to_string()),
        citizen_name: "Legacy".to_string(),
        category: "Other".to_string(),
        description: "Carried over from the paper register".to_string(),
        image_reference: None,
        latitude: None,
        longitude: None,
        status: Status::Resolved,
        created_at: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
    }
}

fn service(store: Arc<MemoryStore>) -> Arc<ComplaintService> {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap());
    Arc::new(
        ComplaintService::new(store as Arc<dyn ComplaintStore>, Arc::new(NoStaff))
            .with_clock(Arc::new(clock)),
    )
}

#[test]
fn test_concurrent_creates_get_distinct_consecutive_codes() {
    const CITIZENS: u32 = 64;

    let store = Arc::new(MemoryStore::new());
    store.import(legacy(1, "MPM-2025-0042")).unwrap();
    store.import(legacy(2, "MPM-2024-0900")).unwrap();
    let svc = service(store.clone());

    let (tx, rx) = crossbeam_channel::unbounded();
    let handles: Vec<_> = (0..CITIZENS)
        .map(|i| {
            let svc = svc.clone();
            let tx = tx.clone();
            may::go!(move || {
                let result = svc.create_complaint(
                    &format!("Citizen {i}"),
                    "Streetlight",
                    "Streetlight out since last week",
                    None,
                    None,
                );
                tx.send(result).unwrap();
            })
        })
        .collect();
    drop(tx);
    for handle in handles {
        handle.join().unwrap();
    }

    let codes: Vec<String> = rx
        .iter()
        .map(|r| r.expect("creation succeeds").reference_code.to_string())
        .collect();
    assert_eq!(codes.len(), CITIZENS as usize);

    let distinct: HashSet<&String> = codes.iter().collect();
    assert_eq!(distinct.len(), codes.len(), "duplicate reference codes issued");

    let mut sequences: Vec<u32> = codes
        .iter()
        .map(|c| ReferenceCode::parse(c).and_then(|c| c.sequence()).unwrap())
        .collect();
    sequences.sort_unstable();
    let expected: Vec<u32> = (43..43 + CITIZENS).collect();
    assert_eq!(sequences, expected);
    assert_eq!(store.len(), CITIZENS as usize + 2);
}

#[test]
fn test_concurrent_creates_from_threads() {
    let store = Arc::new(MemoryStore::new());
    let svc = service(store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let svc = svc.clone();
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        svc.create_complaint(
                            &format!("Resident {t}-{i}"),
                            "Waste",
                            "Rubbish not collected on schedule",
                            None,
                            None,
                        )
                        .unwrap()
                        .reference_code
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut codes: Vec<ReferenceCode> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 200);
    assert_eq!(codes.first().unwrap().as_str(), "MPM-2025-0001");
    assert_eq!(codes.last().unwrap().as_str(), "MPM-2025-0200");
}
