use std::{sync::Arc, thread};
use crate::{LedgerContext, LedgerError, PartyId, Stage, StaticResolver, Store};
use super::{Pki, fence};

const THREADS: usize = 16;

#[test]
fn one_accept_wins() {
    let pki = Pki::new();
    let supplier = pki.enroll("supplier");
    let investor = Arc::new(pki.enroll("investor"));
    let ledger = Arc::new(LedgerContext::new(
        Store::temporary().unwrap(),
        StaticResolver::default(),
    ));

    let contract = ledger.create_contract(PartyId(2), fence()).unwrap();
    let offer = ledger
        .create_offer(contract, PartyId(1), &supplier.certificate, &supplier.sign(&fence()), None)
        .unwrap();
    let signature = Arc::new(investor.sign(&fence()));

    let handles = (0..THREADS)
        .map(|_| {
            let (ledger, investor, signature) = (ledger.clone(), investor.clone(), signature.clone());
            thread::spawn(move || ledger.accept_offer(contract, offer, &investor.certificate, &signature))
        })
        .collect::<Vec<_>>();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    let funded = results.iter().filter(|result| result.is_ok()).count();
    let wrong_stage = results
        .iter()
        .filter(|result| matches!(result, Err(LedgerError::WrongStage(Stage::Funded))))
        .count();
    assert_eq!(funded, 1);
    assert_eq!(wrong_stage, THREADS - 1);
    assert_eq!(ledger.contract(contract).unwrap().stage, Stage::Funded);
}

#[test]
fn competing_offers() {
    let pki = Pki::new();
    let suppliers = (0..4)
        .map(|i| pki.enroll(&format!("supplier {}", i)))
        .collect::<Vec<_>>();
    let investor = Arc::new(pki.enroll("investor"));
    let ledger = Arc::new(LedgerContext::new(
        Store::temporary().unwrap(),
        StaticResolver::default(),
    ));

    let contract = ledger.create_contract(PartyId(100), fence()).unwrap();
    let offers = suppliers
        .iter()
        .enumerate()
        .map(|(i, supplier)| {
            ledger
                .create_offer(contract, PartyId(i as u64), &supplier.certificate, &supplier.sign(&fence()), None)
                .unwrap()
        })
        .collect::<Vec<_>>();
    let signature = Arc::new(investor.sign(&fence()));

    let handles = offers
        .iter()
        .map(|&offer| {
            let (ledger, investor, signature) = (ledger.clone(), investor.clone(), signature.clone());
            thread::spawn(move || {
                ledger
                    .accept_offer(contract, offer, &investor.certificate, &signature)
                    .map(|()| offer)
            })
        })
        .collect::<Vec<_>>();
    let winners = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap().ok())
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);

    let funded = ledger.contract(contract).unwrap();
    let winner = ledger.offer(winners[0]).unwrap();
    assert_eq!(funded.supplier, Some(winner.supplier));
    assert_eq!(funded.supplier_signature, Some(winner.supplier_signature));
}
