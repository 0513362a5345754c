//! Test suites exercising the server over real sockets.
