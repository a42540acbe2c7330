// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Little-endian accessors for byte slices holding device registers.

macro_rules! generate_read_fn {
    ($fn_name: ident, $data_type: ty, $type_size: expr) => {
        /// Reads a little-endian value from the start of `input`.
        ///
        /// Missing trailing bytes read as zero.
        pub fn $fn_name(input: &[u8]) -> $data_type {
            let mut array = [0u8; $type_size];
            for (byte, read) in array.iter_mut().zip(input.iter().cloned()) {
                *byte = read;
            }
            <$data_type>::from_le_bytes(array)
        }
    };
}

macro_rules! generate_write_fn {
    ($fn_name: ident, $data_type: ty) => {
        /// Writes `value` in little-endian order to the start of `buf`.
        ///
        /// Bytes that do not fit in `buf` are dropped.
        pub fn $fn_name(buf: &mut [u8], value: $data_type) {
            for (byte, src) in buf.iter_mut().zip(value.to_le_bytes().iter()) {
                *byte = *src;
            }
        }
    };
}

generate_read_fn!(read_le_u16, u16, 2);
generate_read_fn!(read_le_u32, u32, 4);
generate_read_fn!(read_le_u64, u64, 8);

generate_write_fn!(write_le_u16, u16);
generate_write_fn!(write_le_u32, u32);
generate_write_fn!(write_le_u64, u64);
