mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;

use common::{config, hw, init_tracing, lease4, lease6, now, open};
use lease_cql::{LeaseStore, LeaseStoreError, SchemaStrategyKind, SqliteConnection};
use lease_model::{Duid, HwAddr, LeaseState, LeaseType};

const ADDR: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);

#[test]
fn insert_is_visible_through_every_mirror() {
    let store = open(SchemaStrategyKind::Denormalized);
    let mut lease = lease4(ADDR, now(), 5);
    assert!(store.add_lease4(&mut lease).unwrap());

    let hwaddr = lease.hwaddr.clone().expect("hwaddr set");
    let client = lease.client_id.clone().expect("client id set");
    assert_eq!(store.get_lease4(ADDR).unwrap(), Some(lease.clone()));
    assert_eq!(store.get_lease4_by_hwaddr(&hwaddr).unwrap(), vec![lease.clone()]);
    assert_eq!(
        store.get_lease4_by_hwaddr_subnet(&hwaddr, 5).unwrap(),
        Some(lease.clone())
    );
    assert_eq!(store.get_lease4_by_client_id(&client).unwrap().len(), 1);
    assert_eq!(
        store.get_lease4_by_client_id_subnet(&client, 5).unwrap(),
        Some(lease.clone())
    );
    assert_eq!(store.get_leases4_by_subnet(5).unwrap(), vec![lease]);
}

#[test]
fn lease_without_client_id_skips_that_mirror() {
    let store = open(SchemaStrategyKind::Denormalized);
    let mut lease = lease4(ADDR, now(), 5);
    let client = lease.client_id.take().expect("client id set");
    assert!(store.add_lease4(&mut lease).unwrap());

    assert!(store.get_lease4_by_client_id(&client).unwrap().is_empty());
    assert_eq!(store.get_leases4_by_subnet(5).unwrap().len(), 1);
}

#[test]
fn update_moves_mirror_rows_with_their_keys() {
    let store = open(SchemaStrategyKind::Denormalized);
    store.add_lease4(&mut lease4(ADDR, now(), 5)).unwrap();

    let mut lease = store.get_lease4(ADDR).unwrap().expect("stored");
    let old_hw = lease.hwaddr.clone().expect("hwaddr set");
    lease.hwaddr = Some(hw(0x99));
    lease.subnet_id = 6;
    lease.hostname = "moved.example.org".into();
    store.update_lease4(&mut lease).unwrap();

    assert!(store.get_lease4_by_hwaddr(&old_hw).unwrap().is_empty());
    assert!(store.get_leases4_by_subnet(5).unwrap().is_empty());
    let by_new = store
        .get_lease4_by_hwaddr_subnet(&hw(0x99), 6)
        .unwrap()
        .expect("mirror refreshed");
    assert_eq!(by_new.hostname, "moved.example.org");
    let client = lease.client_id.clone().expect("client id set");
    let by_client = store
        .get_lease4_by_client_id_subnet(&client, 6)
        .unwrap()
        .expect("client mirror moved");
    assert_eq!(by_client.expire(), lease.expire());
    assert!(store
        .get_lease4_by_client_id_subnet(&client, 5)
        .unwrap()
        .is_none());
}

#[test]
fn stale_update_leaves_mirrors_alone() {
    let store = open(SchemaStrategyKind::Denormalized);
    store.add_lease4(&mut lease4(ADDR, now(), 5)).unwrap();
    let mut lease = store.get_lease4(ADDR).unwrap().expect("stored");
    lease.set_observed_expire(lease.observed_expire() + 1);
    lease.subnet_id = 9;
    assert!(matches!(
        store.update_lease4(&mut lease),
        Err(LeaseStoreError::NoSuchLease(_))
    ));
    assert_eq!(store.get_leases4_by_subnet(5).unwrap().len(), 1);
    assert!(store.get_leases4_by_subnet(9).unwrap().is_empty());
}

#[test]
fn delete_clears_every_table() {
    let store = open(SchemaStrategyKind::Denormalized);
    store.add_lease4(&mut lease4(ADDR, now(), 5)).unwrap();
    let lease = store.get_lease4(ADDR).unwrap().expect("stored");
    store.delete_lease4(&lease).unwrap();

    let hwaddr = lease.hwaddr.clone().expect("hwaddr set");
    let client = lease.client_id.clone().expect("client id set");
    assert!(store.get_lease4(ADDR).unwrap().is_none());
    assert!(store.get_lease4_by_hwaddr(&hwaddr).unwrap().is_empty());
    assert!(store.get_lease4_by_client_id(&client).unwrap().is_empty());
    assert!(store.get_leases4_by_subnet(5).unwrap().is_empty());
}

#[test]
fn delete_uses_stored_keys_for_mirrors() {
    let store = open(SchemaStrategyKind::Denormalized);
    store.add_lease4(&mut lease4(ADDR, now(), 5)).unwrap();
    let mut lease = store.get_lease4(ADDR).unwrap().expect("stored");
    let stored_hw = lease.hwaddr.clone().expect("hwaddr set");
    let client = lease.client_id.clone().expect("client id set");
    lease.hwaddr = Some(hw(0x99));
    lease.subnet_id = 6;
    store.delete_lease4(&lease).unwrap();

    assert!(store.get_lease4(ADDR).unwrap().is_none());
    assert!(store.get_lease4_by_hwaddr(&stored_hw).unwrap().is_empty());
    assert!(store.get_lease4_by_client_id(&client).unwrap().is_empty());
    assert!(store.get_leases4_by_subnet(5).unwrap().is_empty());

    assert!(store.add_lease4(&mut lease4(ADDR, now(), 5)).unwrap());
    assert_eq!(store.get_lease4_by_hwaddr(&stored_hw).unwrap().len(), 1);
}

#[test]
fn non_ethernet_hardware_address_survives_mirrors() {
    let store = open(SchemaStrategyKind::Denormalized);
    let mut lease = lease4(ADDR, now(), 5);
    let ieee802 = HwAddr::new(vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60], 6).with_source(4);
    lease.hwaddr = Some(ieee802.clone());
    assert!(store.add_lease4(&mut lease).unwrap());

    assert_eq!(store.get_lease4(ADDR).unwrap(), Some(lease.clone()));
    assert_eq!(
        store.get_lease4_by_hwaddr_subnet(&ieee802, 5).unwrap(),
        Some(lease)
    );
}

#[test]
fn rejected_mirror_insert_keeps_earlier_rows() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leases.sqlite");
    let conn = Arc::new(SqliteConnection::open(&path).unwrap());
    conn.create_schema(SchemaStrategyKind::Denormalized).unwrap();
    let store = LeaseStore::open(config(SchemaStrategyKind::Denormalized), conn).unwrap();

    let mut lease = lease4(ADDR, now(), 5);
    let hwaddr = lease.hwaddr.clone().expect("hwaddr set");
    // A leftover hwaddr row for the same address and subnet.
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute(
        "INSERT INTO lease4_hwaddr (token, address, hwaddr, subnet_id) VALUES (0, ?1, ?2, 5)",
        rusqlite::params![i64::from(u32::from(ADDR)), hwaddr.bytes.clone()],
    )
    .unwrap();
    drop(raw);

    assert!(!store.add_lease4(&mut lease).unwrap());

    let primary = store.get_lease4(ADDR).unwrap().expect("primary row kept");
    assert_eq!(primary.expire(), lease.expire());
    let client = lease.client_id.clone().expect("client id set");
    assert_eq!(store.get_lease4_by_client_id(&client).unwrap().len(), 1);
    assert!(store.get_leases4_by_subnet(5).unwrap().is_empty());
}

#[test]
fn reclaimed_cleanup_is_declined() {
    let store = open(SchemaStrategyKind::Denormalized);
    let mut lease = lease4(ADDR, now(), 5);
    lease.state = LeaseState::ExpiredReclaimed;
    lease.set_expire(now() - 10_000);
    store.add_lease4(&mut lease).unwrap();

    assert_eq!(store.delete_expired_reclaimed_leases4(1).unwrap(), 0);
    assert!(store.get_lease4(ADDR).unwrap().is_some());
    assert_eq!(store.delete_expired_reclaimed_leases6(1).unwrap(), 0);
}

#[test]
fn v6_duid_mirror_follows_updates() {
    let store = open(SchemaStrategyKind::Denormalized);
    let mut lease = lease6("2001:db8::77", LeaseType::Na, now(), 3);
    store.add_lease6(&mut lease).unwrap();
    let duid = lease.duid.clone().expect("duid set");
    assert_eq!(
        store
            .get_leases6_by_duid_iaid_subnet(LeaseType::Na, &duid, 42, 3)
            .unwrap(),
        vec![lease.clone()]
    );

    let new_duid = Duid::new(vec![0xde, 0xad, 0xbe, 0xef]);
    lease.duid = Some(new_duid.clone());
    lease.iaid = 43;
    store.update_lease6(&mut lease).unwrap();

    assert!(store.get_leases6_by_duid(&duid).unwrap().is_empty());
    assert_eq!(
        store
            .get_leases6_by_duid_iaid(LeaseType::Na, &new_duid, 43)
            .unwrap(),
        vec![lease.clone()]
    );

    store.delete_lease6(&lease).unwrap();
    assert!(store.get_leases6_by_duid(&new_duid).unwrap().is_empty());
}
