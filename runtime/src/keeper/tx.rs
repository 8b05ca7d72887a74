use {
    super::{key, prefix, Keeper},
    crate::{
        error::Result,
        msgs::MsgSwap,
        types::{ObservedTxVoter, TxOut, TxOutItem},
    },
    thornode_common::TxId,
};

impl Keeper {
    pub fn get_observed_tx_in_voter(&self, tx_id: &TxId) -> Result<ObservedTxVoter> {
        Ok(self
            .get_record(&key(prefix::OBSERVED_TX_IN, tx_id))?
            .unwrap_or_else(|| ObservedTxVoter::new(tx_id.clone(), Vec::new())))
    }

    pub fn observed_tx_in_voter_exists(&self, tx_id: &TxId) -> bool {
        self.has_record(&key(prefix::OBSERVED_TX_IN, tx_id))
    }

    pub fn set_observed_tx_in_voter(&mut self, voter: &ObservedTxVoter) -> Result<()> {
        self.set_record(&key(prefix::OBSERVED_TX_IN, &voter.tx_id), voter)
    }

    pub fn get_observed_tx_in_voters(&self) -> Result<Vec<ObservedTxVoter>> {
        self.records(prefix::OBSERVED_TX_IN)
    }

    pub fn get_observed_tx_out_voter(&self, tx_id: &TxId) -> Result<ObservedTxVoter> {
        Ok(self
            .get_record(&key(prefix::OBSERVED_TX_OUT, tx_id))?
            .unwrap_or_else(|| ObservedTxVoter::new(tx_id.clone(), Vec::new())))
    }

    pub fn set_observed_tx_out_voter(&mut self, voter: &ObservedTxVoter) -> Result<()> {
        self.set_record(&key(prefix::OBSERVED_TX_OUT, &voter.tx_id), voter)
    }

    pub fn get_observed_tx_out_voters(&self) -> Result<Vec<ObservedTxVoter>> {
        self.records(prefix::OBSERVED_TX_OUT)
    }

    /// Outbounds scheduled for `height`, an empty list when none are.
    pub fn get_tx_out(&self, height: i64) -> Result<TxOut> {
        Ok(self
            .get_record(&key(prefix::TX_OUT, height))?
            .unwrap_or_else(|| TxOut::new(height)))
    }

    pub fn set_tx_out(&mut self, tx_out: &TxOut) -> Result<()> {
        self.set_record(&key(prefix::TX_OUT, tx_out.height), tx_out)
    }

    pub fn append_tx_out(&mut self, height: i64, item: TxOutItem) -> Result<()> {
        let mut tx_out = self.get_tx_out(height)?;
        tx_out.tx_array.push(item);
        self.set_tx_out(&tx_out)
    }

    /// Mark the inbound `tx_id` as having outbounds that ran out of signing
    /// attempts.
    pub fn set_dangling_actions(&mut self, tx_id: &TxId) -> Result<()> {
        self.set_record(&key(prefix::DANGLING_ACTIONS, tx_id), tx_id)
    }

    pub fn remove_dangling_actions(&mut self, tx_id: &TxId) {
        self.delete_record(&key(prefix::DANGLING_ACTIONS, tx_id));
    }

    pub fn get_dangling_actions(&self) -> Result<Vec<TxId>> {
        self.records(prefix::DANGLING_ACTIONS)
    }

    fn swap_queue_key(tx_id: &TxId, index: usize) -> String {
        key(prefix::SWAP_QUEUE, format!("{tx_id}//{index}"))
    }

    pub fn set_swap_queue_item(&mut self, msg: &MsgSwap, index: usize) -> Result<()> {
        self.set_record(&Self::swap_queue_key(&msg.tx.id, index), msg)
    }

    pub fn remove_swap_queue_item(&mut self, tx_id: &TxId, index: usize) {
        self.delete_record(&Self::swap_queue_key(tx_id, index));
    }

    /// Queued swaps with their queue index, in key order.
    pub fn get_swap_queue(&self) -> Result<Vec<(MsgSwap, usize)>> {
        let ids = self.record_ids(prefix::SWAP_QUEUE);
        let msgs: Vec<MsgSwap> = self.records(prefix::SWAP_QUEUE)?;
        Ok(ids
            .iter()
            .zip(msgs)
            .map(|(id, msg)| {
                let index = id
                    .rsplit("//")
                    .next()
                    .and_then(|i| i.parse().ok())
                    .unwrap_or_default();
                (msg, index)
            })
            .collect())
    }

    pub fn set_order_book_item(&mut self, msg: &MsgSwap) -> Result<()> {
        self.set_record(&key(prefix::ORDER_BOOK, &msg.tx.id), msg)
    }

    pub fn remove_order_book_item(&mut self, tx_id: &TxId) {
        self.delete_record(&key(prefix::ORDER_BOOK, tx_id));
    }

    pub fn get_order_book(&self) -> Result<Vec<MsgSwap>> {
        self.records(prefix::ORDER_BOOK)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        thornode_common::{Address, Chain, Coin},
    };

    #[test]
    fn test_tx_out_append() {
        let mut keeper = Keeper::default();
        let item = TxOutItem::new(
            Chain::BNB,
            Address::new("bnb1recipient").unwrap(),
            Coin::new(Chain::BNB.gas_asset(), 100),
            TxId::from_bytes(b"in"),
        );
        keeper.append_tx_out(7, item.clone()).unwrap();
        keeper.append_tx_out(7, item).unwrap();
        assert_eq!(keeper.get_tx_out(7).unwrap().tx_array.len(), 2);
        assert!(keeper.get_tx_out(8).unwrap().is_empty());
    }

    #[test]
    fn test_dangling_actions_index() {
        let mut keeper = Keeper::default();
        let (a, b) = (TxId::from_bytes(b"a"), TxId::from_bytes(b"b"));
        keeper.set_dangling_actions(&a).unwrap();
        keeper.set_dangling_actions(&b).unwrap();
        keeper.set_dangling_actions(&a).unwrap();
        assert_eq!(keeper.get_dangling_actions().unwrap().len(), 2);
        keeper.remove_dangling_actions(&a);
        assert_eq!(keeper.get_dangling_actions().unwrap(), vec![b]);
    }

    #[test]
    fn test_missing_voter_is_empty() {
        let keeper = Keeper::default();
        let id = TxId::from_bytes(b"t1");
        let voter = keeper.get_observed_tx_in_voter(&id).unwrap();
        assert_eq!(voter.tx_id, id);
        assert!(voter.txs.is_empty());
        assert!(!keeper.observed_tx_in_voter_exists(&id));
    }
}
