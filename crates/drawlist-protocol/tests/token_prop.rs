use drawlist_protocol::{
    decode_token, encode_token, HeaderQuery, HeaderTable, ShaderStage, Token, TokenOpcode,
    TokenStreamIter, TokenWriter, Topology,
};
use proptest::prelude::*;

struct Device;

impl HeaderQuery for Device {
    fn command_header(&self, opcode: TokenOpcode, size_bytes: u32) -> u32 {
        0x4C00_0000 | ((opcode as u32) << 8) | size_bytes
    }

    fn stage_index(&self, stage: ShaderStage) -> u16 {
        stage as u16
    }
}

fn headers() -> HeaderTable {
    HeaderTable::from_device(&Device).unwrap()
}

fn topology() -> impl Strategy<Value = Topology> {
    prop::sample::select(Topology::ALL.to_vec())
}

// Finite floats only: NaN would break the PartialEq comparison, not the codec.
fn float() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

fn token() -> impl Strategy<Value = Token> {
    prop_oneof![
        Just(Token::TerminateSequence),
        Just(Token::Nop),
        (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(count, first_index, base_vertex)| {
            Token::DrawElements {
                count,
                first_index,
                base_vertex,
            }
        }),
        (any::<u32>(), any::<u32>()).prop_map(|(count, first)| Token::DrawArrays { count, first }),
        (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(count, first_index, base_vertex)| {
            Token::DrawElementsStrip {
                count,
                first_index,
                base_vertex,
            }
        }),
        (any::<u32>(), any::<u32>())
            .prop_map(|(count, first)| Token::DrawArraysStrip { count, first }),
        (topology(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(mode, count, instance_count, base_instance)| Token::DrawElementsInstanced {
                mode: mode.as_u32(),
                count,
                instance_count,
                first_index: 0,
                base_vertex: 0,
                base_instance,
            }
        ),
        (topology(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(mode, count, instance_count, first)| Token::DrawArraysInstanced {
                mode: mode.as_u32(),
                count,
                instance_count,
                first,
                base_instance: 0,
            }
        ),
        (any::<u64>(), prop::sample::select(vec![2u32, 4u32])).prop_map(
            |(address, type_size_in_byte)| Token::ElementAddress {
                address,
                type_size_in_byte,
            }
        ),
        (0u32..16, any::<u64>())
            .prop_map(|(index, address)| Token::AttributeAddress { index, address }),
        (0u16..8, 0u16..5, any::<u64>()).prop_map(|(index, stage, address)| {
            Token::UniformAddress {
                index,
                stage,
                address,
            }
        }),
        (float(), float(), float(), float()).prop_map(|(red, green, blue, alpha)| {
            Token::BlendColor {
                red,
                green,
                blue,
                alpha,
            }
        }),
        (any::<u32>(), any::<u32>()).prop_map(|(front, back)| Token::StencilRef { front, back }),
        float().prop_map(|width| Token::LineWidth { width }),
        (float(), float()).prop_map(|(scale, bias)| Token::PolygonOffset { scale, bias }),
        float().prop_map(|alpha_ref| Token::AlphaRef { alpha_ref }),
        (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(x, y, width, height)| Token::Viewport {
                x,
                y,
                width,
                height,
            }
        ),
        (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(x, y, width, height)| Token::Scissor {
                x,
                y,
                width,
                height,
            }
        ),
    ]
}

proptest! {
    #[test]
    fn canonical_is_idempotent(t in topology()) {
        if let Some(c) = t.canonical() {
            prop_assert_eq!(c.canonical(), Some(c));
            prop_assert!(!c.is_strip());
        }
    }

    #[test]
    fn strip_mode_stays_in_family(t in topology()) {
        if let Some(c) = t.canonical() {
            prop_assert_eq!(c.strip_mode().canonical(), Some(c));
        }
    }

    #[test]
    fn single_token_round_trips(tok in token()) {
        let headers = headers();
        let bytes = encode_token(&headers, &tok);
        prop_assert_eq!(bytes.len(), tok.opcode().size_bytes());
        let decoded = decode_token(&bytes, 0, &headers).unwrap();
        prop_assert_eq!(decoded.token, tok);
        prop_assert_eq!(decoded.consumed, bytes.len());
    }

    #[test]
    fn concatenated_stream_walks_back_in_order(tokens in prop::collection::vec(token(), 0..64)) {
        let headers = headers();
        let mut w = TokenWriter::new(headers);
        let offsets: Vec<usize> = tokens.iter().map(|t| w.push(t)).collect();

        let decoded: Vec<(usize, Token)> = TokenStreamIter::new(w.as_bytes(), &headers)
            .collect::<Result<_, _>>()
            .unwrap();
        let expected: Vec<(usize, Token)> = offsets.into_iter().zip(tokens).collect();
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn decoder_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let headers = headers();
        for item in TokenStreamIter::new(&bytes, &headers) {
            if item.is_err() {
                break;
            }
        }
    }
}
