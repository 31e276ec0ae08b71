mod common;

use std::collections::HashSet;
use std::net::Ipv6Addr;

use common::{lease6, now, open};
use lease_cql::{LeaseStoreError, SchemaStrategyKind};
use lease_model::{Duid, HwAddr, LeaseState, LeaseType};

#[test]
fn address_and_type_identify_a_lease() {
    let store = open(SchemaStrategyKind::Consolidated);
    let t = now();
    let mut na = lease6("2001:db8::1", LeaseType::Na, t, 1);
    na.hwaddr = Some(HwAddr::new(vec![1, 2, 3, 4, 5, 6], 1).with_source(4));
    na.hostname = "v6.example.org".into();
    let mut ta = lease6("2001:db8::1", LeaseType::Ta, t, 1);
    assert!(store.add_lease6(&mut na).unwrap());
    assert!(store.add_lease6(&mut ta).unwrap());
    assert!(!store.add_lease6(&mut lease6("2001:db8::1", LeaseType::Na, t, 9)).unwrap());

    let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let got = store.get_lease6(LeaseType::Na, addr).unwrap().expect("na stored");
    assert_eq!(got, na);
    assert_eq!(got.expire(), t + 3600);
    assert_eq!(
        store.get_lease6(LeaseType::Ta, addr).unwrap().map(|l| l.lease_type),
        Some(LeaseType::Ta)
    );
    assert!(store.get_lease6(LeaseType::Pd, addr).unwrap().is_none());
}

#[test]
fn delegated_prefix_keeps_its_length() {
    let store = open(SchemaStrategyKind::Consolidated);
    let mut pd = lease6("2001:db8:aa00::", LeaseType::Pd, now(), 3);
    pd.prefixlen = 56;
    pd.pool_id = 11;
    store.add_lease6(&mut pd).unwrap();
    let got = store
        .get_lease6(LeaseType::Pd, pd.addr)
        .unwrap()
        .expect("prefix stored");
    assert_eq!(got.prefixlen, 56);
    assert_eq!(got.pool_id, 11);
}

#[test]
fn duid_lookups() {
    let store = open(SchemaStrategyKind::Consolidated);
    let t = now();
    let mut a = lease6("2001:db8::a", LeaseType::Na, t, 1);
    let mut b = lease6("2001:db8::b", LeaseType::Na, t, 2);
    let mut c = lease6("2001:db8::c", LeaseType::Na, t, 1);
    c.iaid = 7;
    let mut other = lease6("2001:db8::d", LeaseType::Na, t, 1);
    other.duid = Some(Duid::new(vec![9, 9, 9]));
    for lease in [&mut a, &mut b, &mut c, &mut other] {
        store.add_lease6(lease).unwrap();
    }

    let duid = a.duid.clone().expect("duid set");
    assert_eq!(store.get_leases6_by_duid(&duid).unwrap().len(), 3);
    assert_eq!(
        store
            .get_leases6_by_duid_iaid(LeaseType::Na, &duid, 42)
            .unwrap()
            .len(),
        2
    );
    assert!(store
        .get_leases6_by_duid_iaid(LeaseType::Ta, &duid, 42)
        .unwrap()
        .is_empty());
    let scoped = store
        .get_leases6_by_duid_iaid_subnet(LeaseType::Na, &duid, 42, 2)
        .unwrap();
    assert_eq!(scoped, vec![b.clone()]);
    assert_eq!(store.get_leases6_by_subnet(1).unwrap().len(), 3);
    assert_eq!(store.get_leases6().unwrap().len(), 4);
}

#[test]
fn lease_without_duid_is_rejected() {
    let store = open(SchemaStrategyKind::Consolidated);
    let mut lease = lease6("2001:db8::1", LeaseType::Na, now(), 1);
    lease.duid = None;
    assert!(matches!(
        store.add_lease6(&mut lease),
        Err(LeaseStoreError::OperationError(_))
    ));
    assert!(matches!(
        store.get_leases6_by_duid(&Duid::new(vec![0; 129])),
        Err(LeaseStoreError::FieldTooLong { field: "duid", .. })
    ));
}

#[test]
fn update_and_delete_follow_observed_expire() {
    let store = open(SchemaStrategyKind::Consolidated);
    let addr: Ipv6Addr = "2001:db8::42".parse().unwrap();
    store
        .add_lease6(&mut lease6("2001:db8::42", LeaseType::Na, now(), 1))
        .unwrap();

    let original = store.get_lease6(LeaseType::Na, addr).unwrap().expect("stored");
    let mut current = original.clone();
    current.valid_lft = 7200;
    current.preferred_lft = 3600;
    store.update_lease6(&mut current).unwrap();

    let mut stale = original.clone();
    assert!(matches!(
        store.update_lease6(&mut stale),
        Err(LeaseStoreError::NoSuchLease(_))
    ));
    assert!(matches!(
        store.delete_lease6(&original),
        Err(LeaseStoreError::NoSuchLease(_))
    ));

    let stored = store.get_lease6(LeaseType::Na, addr).unwrap().expect("stored");
    assert_eq!(stored.preferred_lft, 3600);
    store.delete_lease6(&stored).unwrap();
    assert!(store.get_lease6(LeaseType::Na, addr).unwrap().is_none());
}

#[test]
fn paging_covers_every_type_of_every_address() {
    let store = open(SchemaStrategyKind::Consolidated);
    let t = now();
    let mut all = HashSet::new();
    for i in 1..=17u16 {
        let text = format!("2001:db8::{i:x}");
        let types: &[LeaseType] = if i % 3 == 0 {
            &[LeaseType::Na, LeaseType::Ta, LeaseType::Pd]
        } else if i % 2 == 0 {
            &[LeaseType::Na, LeaseType::Ta]
        } else {
            &[LeaseType::Na]
        };
        for &lease_type in types {
            assert!(store
                .add_lease6(&mut lease6(&text, lease_type, t, 1))
                .unwrap());
            all.insert((text.parse::<Ipv6Addr>().unwrap(), lease_type));
        }
    }
    for page_size in [1usize, 2, 4, 16, 17, 50] {
        let mut seen = Vec::new();
        let mut lower = (Ipv6Addr::UNSPECIFIED, LeaseType::Na);
        loop {
            let page = store
                .get_leases6_page(lower.0, lower.1, page_size)
                .unwrap();
            assert!(page.len() <= page_size);
            let Some(last) = page.last() else { break };
            lower = (last.addr, last.lease_type);
            seen.extend(page.iter().map(|l| (l.addr, l.lease_type)));
        }
        assert_eq!(seen.len(), all.len(), "page size {page_size}");
        assert_eq!(seen.into_iter().collect::<HashSet<_>>(), all);
    }
}

#[test]
fn expiry_and_reclaimed_cleanup() {
    let store = open(SchemaStrategyKind::Consolidated);
    let t = now();
    let mut expired = lease6("2001:db8::1", LeaseType::Na, t - 10_000, 1);
    let mut reclaimed = lease6("2001:db8::2", LeaseType::Na, t - 10_000, 1);
    reclaimed.state = LeaseState::ExpiredReclaimed;
    let mut live = lease6("2001:db8::3", LeaseType::Na, t, 1);
    for lease in [&mut expired, &mut reclaimed, &mut live] {
        store.add_lease6(lease).unwrap();
    }

    let found = store.get_expired_leases6(10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].addr, expired.addr);

    assert_eq!(store.delete_expired_reclaimed_leases6(60).unwrap(), 1);
    assert!(store
        .get_lease6(LeaseType::Na, reclaimed.addr)
        .unwrap()
        .is_none());
    assert_eq!(store.get_leases6().unwrap().len(), 2);
    assert!(matches!(
        store.wipe_leases6(1),
        Err(LeaseStoreError::NotImplemented(_))
    ));
}
