// Node test binary

mod common;

mod transfer_test;
