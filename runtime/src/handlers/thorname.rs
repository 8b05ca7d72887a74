//! THORNames: short aliases for addresses on every chain.
//!
//! Registration costs `TNSRegisterFee` and comes with a year of validity;
//! anything paid on top buys one block per `TNSFeePerBlock`. The fee stays
//! in the reserve the deposit sent it to.

use {
    super::{wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        managers::Managers,
        msgs::{Msg, MsgManageThorName},
        types::{is_valid_thorname, ThorName},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::safe_sub, Uint},
    thornode_constants::ConstantName,
};

pub(super) static MANAGE_THORNAME: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_v1 as HandlerFn,
    }],
};

fn thorname_msg(msg: &Msg) -> Result<&MsgManageThorName> {
    match msg {
        Msg::ManageThorName(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = thorname_msg(msg)?;
    if !msg.address.is_chain(msg.chain) {
        return Err(RuntimeError::UnknownRequest(format!(
            "address {} is not of chain {}",
            msg.address, msg.chain
        )));
    }
    match ctx.keeper.get_thorname(&msg.name)? {
        None => {
            if !is_valid_thorname(&msg.name) {
                return Err(RuntimeError::UnknownRequest(format!("invalid thorname {}", msg.name)));
            }
            let fee = ctx.config_uint(ConstantName::TNSRegisterFee)?;
            if msg.coin.amount <= fee {
                return Err(RuntimeError::UnknownRequest("not enough funds".to_string()));
            }
        }
        Some(name) => {
            // an expired name is up for grabs
            if name.owner != msg.signer && ctx.block_height() <= name.expire_block_height {
                return Err(RuntimeError::Unauthorized(format!(
                    "no authorization: owned by {}",
                    name.owner
                )));
            }
            if name.expire_block_height < msg.expire_block_height {
                return Err(RuntimeError::UnknownRequest(
                    "cannot artificially inflate expire block height".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = thorname_msg(msg)?;
    if ctx.config_i64(ConstantName::THORNames)? == 0 {
        return Err(RuntimeError::UnknownRequest(
            "THORNames are currently disabled".to_string(),
        ));
    }
    let height = ctx.block_height();
    let existing = ctx.keeper.get_thorname(&msg.name)?;
    let exists = existing.is_some();
    let mut name = existing.unwrap_or_else(|| ThorName {
        name: msg.name.clone(),
        owner: msg.signer.clone(),
        ..ThorName::default()
    });

    let mut registration_fee: Uint = 0;
    let mut fund_amount: Uint = 0;
    if msg.coin.amount > 0 {
        let mut funds = msg.coin.amount;
        let mut add_blocks: i64 = 0;
        if !exists {
            registration_fee = ctx.config_uint(ConstantName::TNSRegisterFee)?;
            funds = safe_sub(funds, registration_fee);
            add_blocks = ctx.config_i64(ConstantName::BlocksPerYear)?;
        }
        let fee_per_block = ctx.config_uint(ConstantName::TNSFeePerBlock)?.max(1);
        fund_amount = funds;
        add_blocks = add_blocks.saturating_add((funds / fee_per_block) as i64);
        name.expire_block_height = if name.expire_block_height < height {
            height + add_blocks
        } else {
            name.expire_block_height + add_blocks
        };
    }

    // owners may shorten a registration, never lengthen it for free
    if msg.expire_block_height > 0 && msg.expire_block_height < name.expire_block_height {
        name.expire_block_height = msg.expire_block_height;
    }
    if let Some(asset) = msg.preferred_asset.as_ref() {
        name.preferred_asset = Some(asset.clone());
    }
    name.set_alias(msg.chain, msg.address.clone());
    if let Some(owner) = msg.owner.as_ref() {
        name.owner = owner.clone();
    }
    debug!("thorname {} expires at {}", name.name, name.expire_block_height);
    ctx.keeper.set_thorname(&name)?;

    mgr.events.emit(
        ctx,
        Event::ThorName {
            name: name.name.clone(),
            chain: msg.chain,
            address: msg.address.clone(),
            registration_fee,
            fund_amount,
            expire: name.expire_block_height,
            owner: name.owner.clone(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::internal_handler, test_utils::*},
        assert_matches::assert_matches,
        thornode_common::{AccAddress, Address, Asset, Chain, Coin, ONE},
    };

    const BLOCKS_PER_YEAR: i64 = 5_256_000;

    fn owner() -> AccAddress {
        AccAddress::new("thorowner").unwrap()
    }

    fn manage(
        ctx: &mut Context,
        mgr: &Managers,
        signer: AccAddress,
        amount: Uint,
        chain: Chain,
        address: &str,
    ) -> Result<()> {
        let msg = Msg::ManageThorName(MsgManageThorName {
            name: "alice".to_string(),
            chain,
            address: Address::new_unchecked(address),
            coin: Coin::new(Asset::rune(), amount),
            expire_block_height: 0,
            preferred_asset: None,
            owner: None,
            signer,
        });
        internal_handler(ctx, mgr, msg)
    }

    #[test]
    fn test_register_and_renew() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        assert_matches!(
            manage(&mut ctx, &mgr, owner(), 10 * ONE, Chain::THOR, "thorowner"),
            Err(RuntimeError::UnknownRequest(_))
        );

        manage(&mut ctx, &mgr, owner(), 10 * ONE + 2_000, Chain::THOR, "thorowner").unwrap();
        let name = ctx.keeper.get_thorname("alice").unwrap().unwrap();
        assert_eq!(name.owner, owner());
        assert_eq!(name.expire_block_height, 10 + BLOCKS_PER_YEAR + 100);
        assert!(ctx.keeper.store().events().iter().any(|e| matches!(
            e,
            Event::ThorName { registration_fee, fund_amount: 2_000, .. } if *registration_fee == 10 * ONE
        )));

        // renewing costs no registration fee
        manage(&mut ctx, &mgr, owner(), 200, Chain::BTC, "bc1qalice").unwrap();
        let name = ctx.keeper.get_thorname("alice").unwrap().unwrap();
        assert_eq!(name.expire_block_height, 10 + BLOCKS_PER_YEAR + 110);
        assert_eq!(name.get_alias(Chain::BTC), Some(&Address::new_unchecked("bc1qalice")));
        assert_eq!(name.get_alias(Chain::THOR), Some(&Address::new_unchecked("thorowner")));
    }

    #[test]
    fn test_only_owner_manages_until_expiry() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        manage(&mut ctx, &mgr, owner(), 10 * ONE + 2_000, Chain::THOR, "thorowner").unwrap();

        let thief = AccAddress::new("thorthief").unwrap();
        assert_matches!(
            manage(&mut ctx, &mgr, thief.clone(), 0, Chain::THOR, "thorthief"),
            Err(RuntimeError::Unauthorized(_))
        );

        let mut later = ctx;
        let mut name = later.keeper.get_thorname("alice").unwrap().unwrap();
        name.expire_block_height = 5;
        later.keeper.set_thorname(&name).unwrap();
        manage(&mut later, &mgr, thief, 0, Chain::THOR, "thorthief").unwrap();
        let name = later.keeper.get_thorname("alice").unwrap().unwrap();
        assert_eq!(name.get_alias(Chain::THOR), Some(&Address::new_unchecked("thorthief")));
    }

    #[test]
    fn test_disabled_by_mimir() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        ctx.keeper.set_mimir("THORNames", 0).unwrap();
        assert_matches!(
            manage(&mut ctx, &mgr, owner(), 11 * ONE, Chain::THOR, "thorowner"),
            Err(RuntimeError::UnknownRequest(_))
        );
    }
}
