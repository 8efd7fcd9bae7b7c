pub mod m1;
