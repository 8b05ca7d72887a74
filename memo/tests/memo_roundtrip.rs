use {
    proptest::prelude::*,
    semver::Version,
    thornode_common::{AccAddress, Address, Asset, Chain, TxId},
    thornode_memo::{
        parse_memo, AddLiquidityMemo, BondMemo, Memo, NoLookup, OrderType, SwapMemo, TxType,
        WithdrawLiquidityMemo,
    },
};

const THOR_ADDR: &str = "thor1xghvhe4p50aqh5zq2t2vls938as0dkr2mzgpgh";
const BNB_ADDR: &str = "bnb1g0xakzh03tpa54khxyvheeu92hwzypkdce77rm";

fn reparse(memo: &Memo) -> Memo {
    parse_memo(&Version::new(1, 112, 0), &NoLookup, &memo.to_string()).unwrap()
}

fn arb_asset() -> impl Strategy<Value = Asset> {
    prop_oneof![
        Just(Asset::rune()),
        Just(Asset::layer1(Chain::BTC, "BTC")),
        Just(Asset::layer1(Chain::BNB, "BNB")),
        Just(Asset::layer1(Chain::ETH, "USDT-0XDAC17F958D2EE523A2206206994597C13D831EC7")),
        Just(Asset::layer1(Chain::BTC, "BTC").synthetic_asset()),
    ]
}

fn arb_address() -> impl Strategy<Value = Address> {
    prop_oneof![
        Just(Address::default()),
        Just(Address::new(THOR_ADDR).unwrap()),
        Just(Address::new(BNB_ADDR).unwrap()),
    ]
}

proptest! {
    #[test]
    fn swap_memo_renders_parseable(
        asset in arb_asset(),
        destination in arb_address(),
        slip_limit in 0u128..u64::MAX as u128,
        affiliate in any::<bool>(),
        bps in 0u128..=10_000,
        dex_limit in proptest::option::of(1u128..1_000_000),
        limit in any::<bool>(),
    ) {
        let (affiliate_address, affiliate_basis_points) = if affiliate {
            (Address::new(THOR_ADDR).unwrap(), bps)
        } else {
            (Address::default(), 0)
        };
        let (dex_aggregator, dex_target_address) = if dex_limit.is_some() {
            ("agg".to_string(), "0xabc".to_string())
        } else {
            (String::new(), String::new())
        };
        let memo = Memo::Swap(SwapMemo {
            asset,
            destination,
            slip_limit,
            affiliate_address,
            affiliate_basis_points,
            dex_aggregator,
            dex_target_address,
            dex_target_limit: dex_limit,
            order_type: if limit { OrderType::Limit } else { OrderType::Market },
        });
        prop_assert_eq!(reparse(&memo), memo);
    }

    #[test]
    fn liquidity_memos_render_parseable(
        asset in arb_asset(),
        address in arb_address(),
        basis_points in 1u128..=10_000,
        withdraw_to_rune in any::<bool>(),
    ) {
        let add = Memo::AddLiquidity(AddLiquidityMemo {
            asset: asset.clone(),
            address,
            affiliate_address: Address::default(),
            affiliate_basis_points: 0,
        });
        prop_assert_eq!(reparse(&add), add);

        let withdraw = Memo::WithdrawLiquidity(WithdrawLiquidityMemo {
            asset,
            basis_points,
            withdrawal_asset: withdraw_to_rune.then(Asset::rune),
        });
        prop_assert_eq!(reparse(&withdraw), withdraw);
    }

    #[test]
    fn bond_memo_renders_parseable(fee in -1i64..=10_000, provider in any::<bool>()) {
        let memo = Memo::Bond(BondMemo {
            node_address: AccAddress::new(THOR_ADDR).unwrap(),
            bond_provider_address: provider.then(|| AccAddress::new(THOR_ADDR).unwrap()),
            node_operator_fee: fee,
        });
        prop_assert_eq!(reparse(&memo), memo);
    }

    #[test]
    fn network_memos_render_parseable(height in 0i64..i64::MAX, seed in any::<[u8; 8]>()) {
        let tx_id = TxId::from_bytes(&seed);
        for memo in [
            Memo::Outbound { tx_id: tx_id.clone() },
            Memo::Refund { tx_id },
            Memo::Migrate { block_height: height },
            Memo::Ragnarok { block_height: height },
            Memo::YggdrasilFund { block_height: height },
            Memo::YggdrasilReturn { block_height: height },
        ] {
            prop_assert_eq!(reparse(&memo), memo);
        }
    }
}

#[test]
fn test_every_canonical_token_resolves() {
    use strum::IntoEnumIterator;
    for tx_type in TxType::iter().filter(|t| !t.is_empty()) {
        assert_eq!(TxType::from_token(tx_type.token()), Some(tx_type));
    }
}
