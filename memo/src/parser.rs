use {
    crate::{
        error::{MemoError, Result},
        lookup::{fetch_address, parse_affiliate_basis_points, MemoLookup},
        memo::*,
        tx_type::TxType,
    },
    log::*,
    semver::Version,
    thornode_common::{AccAddress, Address, Asset, Chain, TxId, Uint, MAX_BASIS_POINTS},
};

type ParseFn = fn(&dyn MemoLookup, &[&str]) -> Result<Memo>;

/// Memo grammar revisions, newest first.
static MEMO_PARSERS: &[(u64, u64, u64, ParseFn)] = &[(1, 98, 0, parse_v98), (0, 1, 0, parse_v1)];

/// Parse `memo` with the grammar in force at `version`.
pub fn parse_memo(version: &Version, lookup: &dyn MemoLookup, memo: &str) -> Result<Memo> {
    let memo = memo.trim();
    if memo.is_empty() {
        return Err(MemoError::Empty);
    }
    let parts: Vec<&str> = memo.split(':').collect();
    let parse = MEMO_PARSERS
        .iter()
        .find(|(major, minor, patch, _)| *version >= Version::new(*major, *minor, *patch))
        .map(|(_, _, _, f)| *f)
        .ok_or_else(|| MemoError::UnsupportedTxType(format!("version {}", version)))?;
    parse(lookup, &parts)
}

fn parse_v98(lookup: &dyn MemoLookup, parts: &[&str]) -> Result<Memo> {
    parse_with(lookup, parts, true)
}

fn parse_v1(lookup: &dyn MemoLookup, parts: &[&str]) -> Result<Memo> {
    parse_with(lookup, parts, false)
}

fn parse_with(lookup: &dyn MemoLookup, parts: &[&str], limit_orders: bool) -> Result<Memo> {
    let tx_type =
        TxType::from_token(parts[0]).ok_or_else(|| MemoError::InvalidTxType(parts[0].to_string()))?;

    let memo = match tx_type {
        TxType::Leave => Memo::Leave {
            node_address: parse_acc(required(parts, 1)?)?,
        },
        TxType::Donate => Memo::Donate {
            asset: parse_asset(parts)?,
        },
        TxType::Add => Memo::AddLiquidity(parse_add(lookup, parse_asset(parts)?, parts)?),
        TxType::Withdraw => Memo::WithdrawLiquidity(parse_withdraw(parse_asset(parts)?, parts)?),
        TxType::LimitOrder if !limit_orders => {
            return Err(MemoError::UnsupportedTxType(parts[0].to_string()))
        }
        TxType::Swap | TxType::LimitOrder => {
            Memo::Swap(parse_swap(lookup, parse_asset(parts)?, tx_type, parts)?)
        }
        TxType::Outbound => Memo::Outbound {
            tx_id: TxId::new(required(parts, 1)?)?,
        },
        TxType::Refund => Memo::Refund {
            tx_id: TxId::new(required(parts, 1)?)?,
        },
        TxType::Bond => Memo::Bond(parse_bond(parts)?),
        TxType::Unbond => Memo::Unbond(parse_unbond(parts)?),
        TxType::YggdrasilFund => Memo::YggdrasilFund {
            block_height: parse_height(parts)?,
        },
        TxType::YggdrasilReturn => Memo::YggdrasilReturn {
            block_height: parse_height(parts)?,
        },
        TxType::Reserve => Memo::Reserve,
        TxType::Migrate => Memo::Migrate {
            block_height: parse_height(parts)?,
        },
        TxType::Ragnarok => Memo::Ragnarok {
            block_height: parse_height(parts)?,
        },
        TxType::Switch => Memo::Switch {
            destination: fetch_address(lookup, required(parts, 1)?, Chain::THOR)?,
        },
        TxType::NoOp => Memo::NoOp {
            action: part(parts, 1).to_string(),
        },
        TxType::Consolidate => Memo::Consolidate,
        TxType::ThorName => Memo::ManageThorName(parse_thorname(parts)?),
        TxType::LoanOpen => Memo::LoanOpen(parse_loan_open(lookup, parse_asset(parts)?, parts)?),
        TxType::LoanRepayment => {
            Memo::LoanRepayment(parse_loan_repayment(lookup, parse_asset(parts)?, parts)?)
        }
        TxType::Unknown => return Err(MemoError::InvalidTxType(parts[0].to_string())),
    };
    Ok(memo)
}

fn parse_asset(parts: &[&str]) -> Result<Asset> {
    Ok(Asset::parse_with_short_codes(required(parts, 1)?)?)
}

fn part<'a>(parts: &[&'a str], idx: usize) -> &'a str {
    parts.get(idx).copied().unwrap_or_default().trim()
}

fn required<'a>(parts: &[&'a str], idx: usize) -> Result<&'a str> {
    match part(parts, idx) {
        "" => Err(MemoError::NotEnoughParameters(parts.join(":"))),
        value => Ok(value),
    }
}

fn parse_acc(value: &str) -> Result<AccAddress> {
    Ok(AccAddress::new(value)?)
}

fn parse_optional_acc(value: &str) -> Result<Option<AccAddress>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_acc(value).map(Some)
}

fn parse_height(parts: &[&str]) -> Result<i64> {
    let value = required(parts, 1)?;
    value.parse().map_err(|_| MemoError::InvalidField {
        field: "block height",
        value: value.to_string(),
    })
}

fn parse_uint(field: &'static str, value: &str) -> Result<Uint> {
    value.parse().map_err(|_| MemoError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Parse a trade target that may be written in scientific notation, e.g.
/// `1.5e8`. Any fractional remainder is truncated.
pub fn parse_trade_target(value: &str) -> Result<Uint> {
    let invalid = || MemoError::InvalidField {
        field: "trade target",
        value: value.to_string(),
    };
    let lower = value.to_lowercase();
    let (mantissa, exponent) = match lower.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().map_err(|_| invalid())?),
        None => (lower.as_str(), 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let digits = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i32 + exponent;
    let integer = if point <= 0 {
        "0".to_string()
    } else if point as usize >= digits.len() {
        format!("{}{}", digits, "0".repeat(point as usize - digits.len()))
    } else {
        digits[..point as usize].to_string()
    };
    let integer = integer.trim_start_matches('0');
    if integer.is_empty() {
        return Ok(0);
    }
    integer.parse().map_err(|_| invalid())
}

fn parse_affiliate(
    lookup: &dyn MemoLookup,
    parts: &[&str],
    addr_idx: usize,
    cap: bool,
) -> Result<(Address, Uint)> {
    let addr = part(parts, addr_idx);
    let pts = part(parts, addr_idx + 1);
    if addr.is_empty() || pts.is_empty() {
        return Ok((Address::default(), 0));
    }
    let addr = fetch_address(lookup, addr, Chain::THOR)?;
    let pts = if cap {
        parse_affiliate_basis_points(lookup, pts)?
    } else {
        parse_uint("affiliate basis points", pts)?
    };
    Ok((addr, pts))
}

fn parse_add(lookup: &dyn MemoLookup, asset: Asset, parts: &[&str]) -> Result<AddLiquidityMemo> {
    let address = match part(parts, 2) {
        "" => Address::default(),
        addr => fetch_address(lookup, addr, asset.chain)?,
    };
    let (affiliate_address, affiliate_basis_points) = parse_affiliate(lookup, parts, 3, true)?;
    Ok(AddLiquidityMemo {
        asset,
        address,
        affiliate_address,
        affiliate_basis_points,
    })
}

fn parse_withdraw(asset: Asset, parts: &[&str]) -> Result<WithdrawLiquidityMemo> {
    let basis_points = match part(parts, 2) {
        "" => MAX_BASIS_POINTS,
        value => parse_uint("withdraw basis points", value)?,
    };
    if basis_points == 0 || basis_points > MAX_BASIS_POINTS {
        return Err(MemoError::InvalidField {
            field: "withdraw basis points",
            value: basis_points.to_string(),
        });
    }
    let withdrawal_asset = match part(parts, 3) {
        "" => None,
        value => Some(Asset::parse(value)?),
    };
    Ok(WithdrawLiquidityMemo {
        asset,
        basis_points,
        withdrawal_asset,
    })
}

fn parse_swap(
    lookup: &dyn MemoLookup,
    asset: Asset,
    tx_type: TxType,
    parts: &[&str],
) -> Result<SwapMemo> {
    let destination = match part(parts, 2) {
        "" => Address::default(),
        dest => fetch_address(lookup, dest, asset.get_chain())?,
    };
    let slip_limit = match part(parts, 3) {
        "" => 0,
        limit => parse_trade_target(limit)?,
    };
    let (affiliate_address, affiliate_basis_points) = parse_affiliate(lookup, parts, 4, true)?;
    let dex_target_limit = match part(parts, 8) {
        "" => None,
        value => match value.parse::<Uint>() {
            Ok(0) => None,
            Ok(limit) => Some(limit),
            Err(_) => {
                warn!("invalid dex target limit, ignore it: {}", value);
                None
            }
        },
    };
    Ok(SwapMemo {
        asset,
        destination,
        slip_limit,
        affiliate_address,
        affiliate_basis_points,
        dex_aggregator: part(parts, 6).to_string(),
        dex_target_address: part(parts, 7).to_string(),
        dex_target_limit,
        order_type: if tx_type == TxType::LimitOrder {
            OrderType::Limit
        } else {
            OrderType::Market
        },
    })
}

fn parse_bond(parts: &[&str]) -> Result<BondMemo> {
    let node_address = parse_acc(required(parts, 1)?)?;
    let bond_provider_address = parse_optional_acc(part(parts, 2))?;
    let node_operator_fee = match part(parts, 3) {
        "" => -1,
        fee => fee.parse().map_err(|_| MemoError::InvalidField {
            field: "operator fee",
            value: fee.to_string(),
        })?,
    };
    Ok(BondMemo {
        node_address,
        bond_provider_address,
        node_operator_fee,
    })
}

fn parse_unbond(parts: &[&str]) -> Result<UnbondMemo> {
    let node_address = parse_acc(required(parts, 1)?)?;
    let amount = parse_uint("unbond amount", required(parts, 2)?)?;
    let bond_provider_address = parse_optional_acc(part(parts, 3))?;
    Ok(UnbondMemo {
        node_address,
        amount,
        bond_provider_address,
    })
}

fn parse_thorname(parts: &[&str]) -> Result<ManageThorNameMemo> {
    if parts.len() < 4 {
        return Err(MemoError::NotEnoughParameters(parts.join(":")));
    }
    let name = required(parts, 1)?.to_string();
    let chain = Chain::parse(required(parts, 2)?)?;
    let address = Address::new(required(parts, 3)?)?;
    let owner = parse_optional_acc(part(parts, 4))?;
    let preferred_asset = match part(parts, 5) {
        "" => None,
        value => Some(Asset::parse(value)?),
    };
    let expire = match part(parts, 6) {
        "" => 0,
        value => value.parse().map_err(|_| MemoError::InvalidField {
            field: "expire",
            value: value.to_string(),
        })?,
    };
    Ok(ManageThorNameMemo {
        name,
        chain,
        address,
        owner,
        preferred_asset,
        expire,
    })
}

fn parse_loan_open(
    lookup: &dyn MemoLookup,
    target_asset: Asset,
    parts: &[&str],
) -> Result<LoanOpenMemo> {
    let target_address = fetch_address(lookup, required(parts, 2)?, target_asset.get_chain())?;
    let min_out = match part(parts, 3) {
        "" => 0,
        value => parse_trade_target(value)?,
    };
    let (affiliate_address, affiliate_basis_points) = parse_affiliate(lookup, parts, 4, false)?;
    let dex_target_limit = match part(parts, 8) {
        "" => 0,
        value => value.parse().unwrap_or_default(),
    };
    Ok(LoanOpenMemo {
        target_asset,
        target_address,
        min_out,
        affiliate_address,
        affiliate_basis_points,
        dex_aggregator: part(parts, 6).to_string(),
        dex_target_address: part(parts, 7).to_string(),
        dex_target_limit,
    })
}

fn parse_loan_repayment(
    lookup: &dyn MemoLookup,
    asset: Asset,
    parts: &[&str],
) -> Result<LoanRepaymentMemo> {
    let owner = fetch_address(lookup, required(parts, 2)?, asset.chain)?;
    let min_out = match part(parts, 3) {
        "" => 0,
        value => parse_trade_target(value)?,
    };
    Ok(LoanRepaymentMemo {
        asset,
        owner,
        min_out,
    })
}
