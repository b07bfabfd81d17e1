//! End-to-end scenarios on a development chain.

use fundme::chain::{Chain, ChainError};
use fundme::config::Config;
use fundme::oracle::PriceFeed;
use fundme::units::parse_ether;
use fundme::{Address, Amount, FundError, Traversal, WithdrawError};

fn deployed() -> (Chain, Address) {
    let config = Config::default();
    let mut chain = Chain::development(&config, "hardhat").unwrap();
    let deployer = chain.signers()[0];
    chain.deploy(&config, deployer).unwrap();
    (chain, deployer)
}

#[test]
fn sets_the_aggregator_address() {
    let (chain, _) = deployed();
    assert_eq!(
        chain.escrow().unwrap().contract.price_feed(),
        chain.price_feed().unwrap().address()
    );
}

#[test]
fn fails_without_enough_value() {
    let (mut chain, deployer) = deployed();
    let err = chain.fund(deployer, Amount::zero()).unwrap_err();
    assert!(matches!(err, ChainError::Fund(FundError::InsufficientValue { .. })));
    assert!(err.to_string().starts_with("You need to spend more ETH!"));
}

#[test]
fn threshold_at_two_thousand_usd() {
    let (mut chain, _) = deployed();
    let funder = chain.signers()[1];
    let before = chain.escrow().unwrap().contract.ledger().digest();
    assert!(chain.fund(funder, parse_ether("0.024").unwrap()).is_err());
    assert_eq!(chain.escrow().unwrap().contract.ledger().digest(), before);
    assert!(chain.fund(funder, parse_ether("0.025").unwrap()).is_ok());
    assert_eq!(
        chain.escrow().unwrap().contract.address_to_amount_funded(&funder),
        parse_ether("0.025").unwrap()
    );
}

#[test]
fn updates_amount_funded_and_funder_list() {
    let (mut chain, deployer) = deployed();
    let value = parse_ether("1").unwrap();
    chain.fund(deployer, value).unwrap();
    let escrow = &chain.escrow().unwrap().contract;
    assert_eq!(escrow.address_to_amount_funded(&deployer), value);
    assert_eq!(escrow.funder(0), Some(deployer));
}

#[test]
fn single_funder_gets_everything_back() {
    let (mut chain, deployer) = deployed();
    let starting_deployer = chain.balance_of(&deployer);
    chain.fund(deployer, parse_ether("1").unwrap()).unwrap();
    let starting_escrow = chain.escrow().unwrap().contract.balance();

    chain.withdraw(deployer, Traversal::Straightforward).unwrap();

    assert_eq!(chain.escrow().unwrap().contract.balance(), Amount::zero());
    assert_eq!(
        chain.balance_of(&deployer),
        starting_deployer - parse_ether("1").unwrap() + starting_escrow
    );
}

#[test]
fn withdraw_with_five_funders() {
    let (mut chain, deployer) = deployed();
    let funders: Vec<Address> = chain.signers()[1..6].to_vec();
    for funder in &funders {
        chain.fund(*funder, parse_ether("1").unwrap()).unwrap();
    }
    {
        let escrow = &chain.escrow().unwrap().contract;
        assert_eq!(escrow.balance(), parse_ether("5").unwrap());
        assert_eq!(escrow.funder_count(), 5);
    }
    let starting_deployer = chain.balance_of(&deployer);

    let receipt = chain.withdraw(deployer, Traversal::CachedLength).unwrap();

    assert_eq!(receipt.funders, funders);
    assert_eq!(chain.balance_of(&deployer), starting_deployer + parse_ether("5").unwrap());
    let escrow = &chain.escrow().unwrap().contract;
    assert_eq!(escrow.balance(), Amount::zero());
    assert_eq!(escrow.funder_count(), 0);
    assert_eq!(escrow.funder(0), None);
    for funder in &funders {
        assert_eq!(escrow.address_to_amount_funded(funder), Amount::zero());
    }
}

#[test]
fn only_the_owner_can_withdraw() {
    let (mut chain, deployer) = deployed();
    chain.fund(deployer, parse_ether("1").unwrap()).unwrap();
    let attacker = chain.signers()[1];
    let before = chain.escrow().unwrap().contract.clone();

    for traversal in [Traversal::Straightforward, Traversal::CachedLength] {
        let err = chain.withdraw(attacker, traversal).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Withdraw(WithdrawError::NotOwner { caller }) if caller == attacker
        ));
    }
    assert_eq!(chain.escrow().unwrap().contract, before);
}

#[test]
fn fund_and_withdraw_round() {
    let (mut chain, deployer) = deployed();
    chain.fund(deployer, parse_ether("0.1").unwrap()).unwrap();
    chain.withdraw(deployer, Traversal::Straightforward).unwrap();
    assert_eq!(chain.escrow().unwrap().contract.balance(), Amount::zero());
    // the escrow is reusable after a withdrawal
    chain.fund(deployer, parse_ether("0.1").unwrap()).unwrap();
    assert_eq!(chain.escrow().unwrap().contract.funder_count(), 1);
}
