//! Tests for the ring transport and the chunked reduction

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::energy_impl::kernel::{two_body_kernel, TwoBodyParts};
    use crate::error::{EstimatorError, EstimatorResult};
    use crate::hamiltonian::{partition_aux, CholeskySlab, InteractionSlab};
    use backend::random::{random_complex_matrix, random_real_matrix, seeded_rng};
    use backend::{CMatrix, CpuBackend, C64};
    use std::thread;

    type Walkers = (Vec<CMatrix>, Vec<CMatrix>);

    fn random_slab(seed: u64, naux: usize, nocc: usize, nbasis: usize) -> InteractionSlab {
        let mut rng = seeded_rng(seed);
        let alpha = (0..naux)
            .map(|_| random_real_matrix(&mut rng, nocc, nbasis))
            .collect();
        let beta = (0..naux)
            .map(|_| random_real_matrix(&mut rng, nocc, nbasis))
            .collect();
        InteractionSlab::new(
            CholeskySlab::from_real(alpha, nocc, nbasis).unwrap(),
            CholeskySlab::from_real(beta, nocc, nbasis).unwrap(),
        )
        .unwrap()
    }

    fn random_walkers(seed: u64, nwalkers: usize, nocc: usize, nbasis: usize) -> Walkers {
        let mut rng = seeded_rng(seed);
        let ga = (0..nwalkers)
            .map(|_| random_complex_matrix(&mut rng, nocc, nbasis))
            .collect();
        let gb = (0..nwalkers)
            .map(|_| random_complex_matrix(&mut rng, nocc, nbasis))
            .collect();
        (ga, gb)
    }

    /// Run the reducer on `size` threads, rank `r` holding slab `r` and `walkers[r]`.
    fn run_ring(
        slab: &InteractionSlab,
        size: usize,
        walkers: &[Walkers],
        restricted: bool,
    ) -> Vec<TwoBodyParts> {
        let ranges = partition_aux(slab.naux(), size).unwrap();
        let transports = ChannelTransport::ring(size).unwrap();
        thread::scope(|scope| {
            let handles: Vec<_> = transports
                .into_iter()
                .zip(ranges)
                .zip(walkers.iter())
                .map(|((transport, range), (ga, gb))| {
                    let local = slab.chunk(range).unwrap();
                    scope.spawn(move || {
                        let reducer =
                            ChunkRingReducer::new(&transport, &local, restricted, &CpuBackend);
                        reducer.reduce(ga, gb).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn assert_parts_close(a: &TwoBodyParts, b: &TwoBodyParts, context: &str) {
        for w in 0..a.nwalkers() {
            let scale = b.ecoul[w].norm().max(1.0);
            assert!(
                (a.ecoul[w] - b.ecoul[w]).norm() < 1e-10 * scale,
                "{}: ecoul of walker {} is {} instead of {}",
                context,
                w,
                a.ecoul[w],
                b.ecoul[w]
            );
            let scale = b.exx[w].norm().max(1.0);
            assert!(
                (a.exx[w] - b.exx[w]).norm() < 1e-10 * scale,
                "{}: exx of walker {} is {} instead of {}",
                context,
                w,
                a.exx[w],
                b.exx[w]
            );
        }
    }

    #[test]
    fn test_chunked_reduction_matches_unchunked_kernel() {
        let (nbasis, nocc, naux) = (5, 2, 7);
        let slab = random_slab(1, naux, nocc, nbasis);
        let walkers = random_walkers(2, 3, nocc, nbasis);
        for restricted in [false, true] {
            let expected =
                two_body_kernel(&slab, &walkers.0, &walkers.1, restricted, &CpuBackend).unwrap();
            for size in 1..=3 {
                let per_rank = vec![walkers.clone(); size];
                for (rank, parts) in run_ring(&slab, size, &per_rank, restricted)
                    .iter()
                    .enumerate()
                {
                    let context = format!("P={} rank={} restricted={}", size, rank, restricted);
                    assert_parts_close(parts, &expected, &context);
                }
            }
        }
    }

    #[test]
    fn test_three_factors_split_two_and_one() {
        let (nbasis, nocc, naux) = (4, 2, 3);
        let ranges = partition_aux(naux, 2).unwrap();
        assert_eq!(ranges, vec![0..2, 2..3]);

        let slab = random_slab(3, naux, nocc, nbasis);
        let walkers = random_walkers(4, 2, nocc, nbasis);
        let expected = two_body_kernel(&slab, &walkers.0, &walkers.1, false, &CpuBackend).unwrap();
        let results = run_ring(&slab, 2, &[walkers.clone(), walkers.clone()], false);
        for parts in results.iter() {
            assert_parts_close(parts, &expected, "slabs (2, 1)");
        }
    }

    #[test]
    fn test_each_rank_gets_the_sums_of_its_own_walkers() {
        let (nbasis, nocc, naux) = (4, 2, 6);
        let slab = random_slab(5, naux, nocc, nbasis);
        let per_rank: Vec<Walkers> = (0..3)
            .map(|r| random_walkers(10 + r, 2, nocc, nbasis))
            .collect();
        let results = run_ring(&slab, 3, &per_rank, false);
        for (rank, parts) in results.iter().enumerate() {
            let (ga, gb) = &per_rank[rank];
            let expected = two_body_kernel(&slab, ga, gb, false, &CpuBackend).unwrap();
            assert_parts_close(parts, &expected, &format!("rank {}", rank));
        }
    }

    #[test]
    fn test_single_process_ring_is_the_plain_kernel() {
        let slab = random_slab(6, 3, 2, 4);
        let walkers = random_walkers(7, 2, 2, 4);
        let results = run_ring(&slab, 1, &[walkers.clone()], false);
        let expected = two_body_kernel(&slab, &walkers.0, &walkers.1, false, &CpuBackend).unwrap();
        assert_eq!(results[0], expected);
    }

    #[test]
    fn test_partition_covers_the_auxiliary_axis() {
        for naux in 1..8 {
            for ngroups in 1..=naux {
                let ranges = partition_aux(naux, ngroups).unwrap();
                assert_eq!(ranges.len(), ngroups);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[ngroups - 1].end, naux);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                assert!(ranges.iter().all(|r| !r.is_empty()));
            }
        }
        assert!(matches!(
            partition_aux(2, 3),
            Err(EstimatorError::GroupSize { .. })
        ));
        assert!(partition_aux(4, 0).is_err());
    }

    #[test]
    fn test_topology_validation() {
        let good: Vec<_> = (0..4).map(|r| RingTopology::cyclic(r, 4).unwrap()).collect();
        assert!(RingTopology::validate_group(&good).is_ok());
        assert_eq!(good[0].recv_from, 3);
        assert_eq!(good[3].send_to, 0);

        // Two disjoint pairs are not a single ring.
        let split = vec![
            RingTopology::new(0, 4, 1, 1).unwrap(),
            RingTopology::new(1, 4, 0, 0).unwrap(),
            RingTopology::new(2, 4, 3, 3).unwrap(),
            RingTopology::new(3, 4, 2, 2).unwrap(),
        ];
        assert!(matches!(
            RingTopology::validate_group(&split),
            Err(EstimatorError::Communication(_))
        ));

        let wrong_size = vec![
            RingTopology::cyclic(0, 2).unwrap(),
            RingTopology::cyclic(1, 3).unwrap(),
        ];
        assert!(matches!(
            RingTopology::validate_group(&wrong_size),
            Err(EstimatorError::GroupSize {
                expected: 2,
                actual: 3
            })
        ));

        assert!(RingTopology::new(3, 3, 0, 1).is_err());
        assert!(RingTopology::cyclic(0, 0).is_err());
    }

    #[test]
    fn test_unexpected_message_kind_is_fatal() {
        let sums = RingMessage::Sums {
            ecoul: vec![C64::new(1.0, 0.0)],
            exx: vec![C64::new(0.5, 0.0)],
        };
        assert!(matches!(
            sums.into_round(),
            Err(EstimatorError::Communication(_))
        ));

        let round = RingMessage::Round(RoundMessage {
            ghalfa: vec![],
            ghalfb: vec![],
            ecoul: vec![],
            exx: vec![],
        });
        assert!(round.into_sums().is_err());
    }

    #[test]
    fn test_disconnected_neighbour_is_reported() {
        let mut transports = ChannelTransport::ring(2).unwrap();
        let second = transports.pop().unwrap();
        let first = transports.pop().unwrap();
        drop(second);
        assert!(matches!(
            first.send(RingMessage::Sums {
                ecoul: vec![],
                exx: vec![]
            }),
            Err(EstimatorError::Communication(_))
        ));
        assert!(matches!(first.recv(), Err(EstimatorError::Communication(_))));
    }

    /// Channel ring that only carries the flat encoding, like a transport over MPI buffers.
    struct EncodedTransport(ChannelTransport);

    impl RingTransport for EncodedTransport {
        fn topology(&self) -> RingTopology {
            self.0.topology()
        }

        fn send(&self, message: RingMessage) -> EstimatorResult<()> {
            let (tag, buf) = codec::encode(&message)?;
            let header = RingMessage::Sums {
                ecoul: vec![C64::new(tag as f64, 0.0)],
                exx: buf.into_iter().map(|x| C64::new(x, 0.0)).collect(),
            };
            self.0.send(header)
        }

        fn recv(&self) -> EstimatorResult<RingMessage> {
            let (tag, buf) = self.0.recv()?.into_sums()?;
            let buf: Vec<f64> = buf.iter().map(|z| z.re).collect();
            codec::decode(tag[0].re as i32, &buf)
        }

        fn barrier(&self) -> EstimatorResult<()> {
            self.0.barrier()
        }
    }

    #[test]
    fn test_reduction_over_encoded_messages() {
        let (nbasis, nocc, naux) = (5, 2, 6);
        let slab = random_slab(20, naux, nocc, nbasis);
        let walkers = random_walkers(21, 3, nocc, nbasis);
        let expected = two_body_kernel(&slab, &walkers.0, &walkers.1, false, &CpuBackend).unwrap();

        let size = 3;
        let ranges = partition_aux(naux, size).unwrap();
        let transports = ChannelTransport::ring(size).unwrap();
        let results: Vec<TwoBodyParts> = thread::scope(|scope| {
            let handles: Vec<_> = transports
                .into_iter()
                .zip(ranges)
                .map(|(transport, range)| {
                    let local = slab.chunk(range).unwrap();
                    let (ga, gb) = (&walkers.0, &walkers.1);
                    scope.spawn(move || {
                        let transport = EncodedTransport(transport);
                        let reducer =
                            ChunkRingReducer::new(&transport, &local, false, &CpuBackend);
                        reducer.reduce(ga, gb).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (rank, parts) in results.iter().enumerate() {
            assert_parts_close(parts, &expected, &format!("encoded rank {}", rank));
        }
    }

    #[test]
    fn test_round_encoding_keeps_shapes_and_values() {
        let (ga, gb) = random_walkers(22, 2, 3, 4);
        let gb: Vec<CMatrix> = gb.iter().map(|g| g.rows(0, 1).clone_owned()).collect();
        let round = RingMessage::Round(RoundMessage {
            ghalfa: ga.clone(),
            ghalfb: gb.clone(),
            ecoul: vec![C64::new(1.5, -0.5), C64::new(0.0, 2.0)],
            exx: vec![C64::new(-3.0, 0.25), C64::new(7.0, 0.0)],
        });
        let (tag, buf) = codec::encode(&round).unwrap();
        assert_eq!(tag, codec::ROUND_TAG);
        assert_eq!(&buf[..4], &[2.0, 3.0, 1.0, 4.0]);

        let decoded = codec::decode(tag, &buf).unwrap().into_round().unwrap();
        assert_eq!(decoded.ghalfa, ga);
        assert_eq!(decoded.ghalfb, gb);
        assert_eq!(decoded.ecoul[1], C64::new(0.0, 2.0));
        assert_eq!(decoded.exx[0], C64::new(-3.0, 0.25));
    }

    #[test]
    fn test_malformed_encodings_are_rejected() {
        let sums = RingMessage::Sums {
            ecoul: vec![C64::new(1.0, 0.0)],
            exx: vec![C64::new(2.0, 0.0)],
        };
        let (tag, buf) = codec::encode(&sums).unwrap();
        assert_eq!(tag, codec::SUMS_TAG);

        for (tag, buf) in [
            (7, buf.clone()),
            (tag, buf[..buf.len() - 1].to_vec()),
            (tag, [buf.clone(), vec![0.0]].concat()),
            (tag, vec![-1.0]),
            (codec::ROUND_TAG, buf.clone()),
        ] {
            assert!(matches!(
                codec::decode(tag, &buf),
                Err(EstimatorError::Communication(_))
            ));
        }

        let uneven = RingMessage::Sums {
            ecoul: vec![C64::new(1.0, 0.0)],
            exx: vec![],
        };
        assert!(codec::encode(&uneven).is_err());
    }
}
