use l2_backtest::prelude::{
    Book, EvlogReader, EvlogWriter, IndexEntry, L2Batch, L2Update, LevelBook, Quantizer, Side,
    returns_from_equity,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Bid), Just(Side::Ask)]
}

fn arb_update() -> impl Strategy<Value = L2Update> {
    (arb_side(), 1i64..10_000, 0i64..10_000, any::<bool>()).prop_map(
        |(side, price_ticks, amount_lots, is_snapshot)| L2Update {
            side,
            price_ticks,
            amount_lots,
            is_snapshot,
        },
    )
}

fn arb_batches() -> impl Strategy<Value = Vec<L2Batch>> {
    // Non-decreasing receive timestamps, arbitrary update lists.
    prop::collection::vec(
        (0i64..1_000, 0i64..1_000_000, any::<bool>(), prop::collection::vec(arb_update(), 0..8)),
        1..16,
    )
    .prop_map(|raw| {
        let mut ts = 0i64;
        raw.into_iter()
            .map(|(dt, ts_exch_ns, resets_book, updates)| {
                ts += dt;
                L2Batch {
                    ts_recv_ns: ts,
                    ts_exch_ns,
                    resets_book,
                    updates,
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_quantizer_roundtrip_is_exact(
        inc_mantissa in 1i64..10_000,
        inc_scale in 0u32..6,
        multiplier in 1i64..1_000_000,
    ) {
        let increment = Decimal::new(inc_mantissa, inc_scale);
        let quantizer = Quantizer::new(increment, Decimal::ONE).unwrap();
        let value = increment * Decimal::from(multiplier);

        let ticks = quantizer.quantize_price(&value.to_string()).unwrap();
        // quantize(value) * increment == value
        prop_assert_eq!(
            Decimal::from(ticks) * quantizer.price_increment().normalize(),
            value.normalize()
        );
        prop_assert_eq!(ticks, multiplier);
    }

    #[test]
    fn prop_quantizer_rejects_off_grid_values(
        multiplier in 1i64..1_000_000,
    ) {
        // Values half a tick off the grid never quantize.
        let quantizer = Quantizer::from_strs("0.10", "1").unwrap();
        let value = Decimal::new(multiplier * 10 + 5, 2); // k*0.10 + 0.05
        prop_assert!(quantizer.quantize_price(&value.to_string()).is_err());
    }

    #[test]
    fn prop_writer_reader_roundtrip(batches in arb_batches()) {
        let dir = tempfile::tempdir().unwrap();
        let evlog = dir.path().join("prop.evlog");
        let idx = dir.path().join("prop.idx");

        let mut writer = EvlogWriter::create(&evlog, 7, 8, &[3u8; 32]).unwrap();
        let mut entries = Vec::new();
        for batch in &batches {
            let offset = writer.tell();
            writer.write_l2_batch(batch).unwrap();
            entries.push(IndexEntry {
                ts_recv_ns: batch.ts_recv_ns,
                offset: offset as i64,
            });
        }
        writer.finish().unwrap();
        l2_backtest::evlog::write_index(&idx, &entries).unwrap();

        let mut reader = EvlogReader::open_with_index(&evlog, &idx).unwrap();
        let decoded: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
        prop_assert_eq!(decoded.unwrap(), batches.clone());

        // Seeking to the first timestamp replays everything.
        reader.seek_time(batches[0].ts_recv_ns).unwrap();
        let replayed: Result<Vec<_>, _> = reader.iter_l2_batches().collect();
        prop_assert_eq!(replayed.unwrap().len(), batches.len());
    }

    #[test]
    fn prop_index_seek_finds_first_ge_batch(batches in arb_batches(), probe in 0i64..20_000) {
        let dir = tempfile::tempdir().unwrap();
        let evlog = dir.path().join("prop.evlog");
        let idx = dir.path().join("prop.idx");

        let mut writer = EvlogWriter::create(&evlog, 7, 8, &[3u8; 32]).unwrap();
        let mut entries = Vec::new();
        for batch in &batches {
            let offset = writer.tell();
            writer.write_l2_batch(batch).unwrap();
            entries.push(IndexEntry {
                ts_recv_ns: batch.ts_recv_ns,
                offset: offset as i64,
            });
        }
        writer.finish().unwrap();
        l2_backtest::evlog::write_index(&idx, &entries).unwrap();

        let mut reader = EvlogReader::open_with_index(&evlog, &idx).unwrap();
        reader.seek_time(probe).unwrap();
        let first = reader.iter_l2_batches().next().transpose().unwrap();

        let expected = batches.iter().find(|b| b.ts_recv_ns >= probe);
        match (first, expected) {
            (Some(got), Some(want)) => prop_assert_eq!(&got, want),
            (None, None) => {}
            (got, want) => prop_assert!(false, "seek mismatch: {:?} vs {:?}", got, want),
        }
    }

    #[test]
    fn prop_book_top_matches_levels(updates in prop::collection::vec(arb_update(), 0..64)) {
        let mut book = LevelBook::with_reject_crossed(false);
        let batch = L2Batch {
            ts_recv_ns: 0,
            ts_exch_ns: 0,
            resets_book: false,
            updates,
        };
        book.apply_l2_batch(&batch).unwrap();

        let (bid, ask) = book.best_bid_ask();
        let (bid_prices, bid_sizes) = book.levels(Side::Bid, usize::MAX);
        let (ask_prices, ask_sizes) = book.levels(Side::Ask, usize::MAX);

        // Top of book agrees with the level listings.
        prop_assert_eq!(bid, bid_prices.first().copied().zip(bid_sizes.first().copied()));
        prop_assert_eq!(ask, ask_prices.first().copied().zip(ask_sizes.first().copied()));

        // Bids descend, asks ascend, and no zero-size level survives.
        prop_assert!(bid_prices.windows(2).all(|w| w[0] > w[1]));
        prop_assert!(ask_prices.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(bid_sizes.iter().chain(ask_sizes.iter()).all(|&s| s > 0));
    }

    #[test]
    fn prop_returns_reconstruct_final_equity(
        initial_cash in 1i64..1_000_000,
        deltas in prop::collection::vec(-10_000i64..10_000, 1..32),
    ) {
        let mut equity = vec![initial_cash];
        for delta in &deltas {
            equity.push(equity[equity.len() - 1] + delta);
        }
        let returns = returns_from_equity(&equity, initial_cash).unwrap();
        prop_assert_eq!(returns.len(), deltas.len());

        // Sum of returns times initial_cash/10_000 equals the total
        // equity move, up to one half-even residue per step.
        let total: i128 = returns.iter().map(|&r| i128::from(r)).sum();
        let reconstructed = total * i128::from(initial_cash) / 10_000;
        let actual = i128::from(equity[equity.len() - 1] - equity[0]);
        let bound = (deltas.len() as i128 + 2) * i128::from(initial_cash) / 20_000 + 1;
        prop_assert!(
            (reconstructed - actual).abs() <= bound,
            "reconstructed {} vs actual {} (bound {})",
            reconstructed,
            actual,
            bound
        );
    }
}
